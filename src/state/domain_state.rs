use crate::crawler::{PermitPool, RateLimiter};
use crate::robots::RobotsRules;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Tracks the state of a domain during crawling
///
/// One instance exists per distinct host (plus non-default port), created
/// lazily on first use and kept for the life of the session. Each domain
/// carries its own locks, so unrelated domains never contend.
#[derive(Debug)]
pub struct DomainState {
    /// Host key, e.g. `docs.example.com` or `127.0.0.1:8080`
    pub host: String,

    /// Token bucket pacing requests to this domain
    pub limiter: RateLimiter,

    /// Per-domain concurrency permits
    pub permits: PermitPool,

    /// robots.txt rules, fetched at most once
    robots: OnceCell<Arc<RobotsRules>>,
}

impl DomainState {
    /// Creates a new DomainState
    ///
    /// # Arguments
    ///
    /// * `host` - The domain key
    /// * `burst` - Token bucket capacity
    /// * `rate` - Token refill rate (tokens per second)
    /// * `max_concurrent` - Per-domain permit count
    pub fn new(host: &str, burst: u32, rate: f64, max_concurrent: usize) -> Self {
        Self {
            host: host.to_string(),
            limiter: RateLimiter::new(burst, rate),
            permits: PermitPool::new(max_concurrent),
            robots: OnceCell::new(),
        }
    }

    /// Returns the cached robots rules, running `fetch` on first use
    ///
    /// Concurrent callers wait for the single in-progress fetch instead of
    /// issuing their own.
    pub async fn robots_or_fetch<F, Fut>(&self, fetch: F) -> Arc<RobotsRules>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = RobotsRules>,
    {
        self.robots
            .get_or_init(|| async { Arc::new(fetch().await) })
            .await
            .clone()
    }

    /// Cached robots rules, if already fetched
    pub fn robots(&self) -> Option<Arc<RobotsRules>> {
        self.robots.get().cloned()
    }

    /// When robots.txt was fetched for this domain
    pub fn robots_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.robots.get().map(|rules| rules.fetched_at)
    }

    /// Requests currently holding a permit for this domain
    pub fn in_flight(&self) -> usize {
        self.permits.in_flight()
    }
}
