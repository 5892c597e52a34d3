//! Crawl session: everything one crawl shares across its tasks
//!
//! A [`CrawlSession`] owns the per-domain state map, the global permit pool
//! and the stop signal. Nothing here is process-global, so independent
//! sessions can run side by side in one process.

use crate::config::Config;
use crate::crawler::{
    acquire_both, build_http_client, FetchPermit, LinkExtractor, PermitPool, RetryPolicy,
};
use crate::robots::{fetch_robots, RobotsRules};
use crate::state::DomainState;
use crate::url::{domain_key, UrlFilter};
use crate::{CrawlError, Result};
use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, AcquireError};
use tracing::{debug, info};
use url::Url;

/// Shared state of one crawl
#[derive(Debug)]
pub struct CrawlSession {
    config: Arc<Config>,
    client: Client,
    domains: DashMap<String, Arc<DomainState>>,
    global: PermitPool,
    retry: RetryPolicy,
    filter: UrlFilter,
    extractor: LinkExtractor,
    robots_agent: String,
    stop: watch::Sender<bool>,
}

impl CrawlSession {
    /// Creates a session with an HTTP client built from the configuration
    ///
    /// # Errors
    ///
    /// Fails if the client cannot be built or a URL pattern does not compile.
    pub fn new(config: Config) -> Result<Self> {
        let client = build_http_client(&config)?;
        Self::with_client(config, client)
    }

    /// Creates a session around an existing client
    pub fn with_client(config: Config, client: Client) -> Result<Self> {
        let filter = UrlFilter::from_site(&config.site)?;
        let extractor = LinkExtractor::new(&config.crawling.link_selectors);
        let (stop, _) = watch::channel(false);

        Ok(Self {
            global: PermitPool::new(config.crawling.global_concurrent_requests),
            retry: RetryPolicy::from_config(&config.crawling),
            robots_agent: config.user_agent.crawler_name.clone(),
            config: Arc::new(config),
            client,
            domains: DashMap::new(),
            filter,
            extractor,
            stop,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn filter(&self) -> &UrlFilter {
        &self.filter
    }

    pub fn extractor(&self) -> &LinkExtractor {
        &self.extractor
    }

    pub fn global_permits(&self) -> &PermitPool {
        &self.global
    }

    /// Token matched against robots.txt `User-agent` lines
    pub fn robots_agent(&self) -> &str {
        &self.robots_agent
    }

    /// Gets or lazily creates the state for a domain
    ///
    /// The map guard is released before the `Arc` is returned, so callers
    /// can hold the state across awaits.
    pub fn domain(&self, host: &str) -> Arc<DomainState> {
        if let Some(state) = self.domains.get(host) {
            return state.clone();
        }
        let crawling = &self.config.crawling;
        self.domains
            .entry(host.to_string())
            .or_insert_with(|| {
                debug!(domain = %host, "new domain state");
                Arc::new(DomainState::new(
                    host,
                    crawling.rate_limiter_burst_size,
                    crawling.refill_rate(),
                    crawling.per_domain_concurrent_requests,
                ))
            })
            .clone()
    }

    /// Every domain seen so far
    pub fn domains(&self) -> Vec<Arc<DomainState>> {
        self.domains.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Acquires the global permit, then the domain's permit
    pub async fn acquire_permits(
        &self,
        host: &str,
    ) -> std::result::Result<FetchPermit, AcquireError> {
        let state = self.domain(host);
        acquire_both(&self.global, &state.permits).await
    }

    /// Waits for a rate-limiter token for the domain
    pub async fn acquire_token(&self, host: &str) -> Duration {
        let state = self.domain(host);
        state.limiter.acquire(host).await
    }

    /// Cached robots.txt rules for the URL's domain, fetching on first use
    ///
    /// On the first fetch a `Crawl-delay` longer than the configured delay
    /// lowers the domain's refill rate.
    ///
    /// # Errors
    ///
    /// [`CrawlError::Robots`] if the URL has no host to fetch robots.txt from.
    pub async fn robots_for(&self, url: &Url) -> Result<Arc<RobotsRules>> {
        let host = domain_key(url)
            .ok_or_else(|| CrawlError::Robots(format!("no host in {}", url)))?;
        let state = self.domain(&host);
        let fail_open = self.config.crawling.robots_fail_open;
        let configured_delay = self.config.crawling.delay_between_requests;

        let rules = state
            .robots_or_fetch(|| async {
                let rules = fetch_robots(&self.client, url, fail_open).await;
                if let Some(delay) = rules.crawl_delay(&self.robots_agent) {
                    if delay > configured_delay {
                        info!(
                            domain = %host,
                            crawl_delay = delay,
                            "honoring robots.txt crawl-delay"
                        );
                        state.limiter.apply_crawl_delay(&host, delay).await;
                    }
                }
                rules
            })
            .await;
        Ok(rules)
    }

    /// Checks robots.txt for a URL
    ///
    /// Always true when `respect-robots-txt` is off.
    pub async fn robots_allows(&self, url: &Url) -> bool {
        if !self.config.crawling.respect_robots_txt {
            return true;
        }
        match self.robots_for(url).await {
            Ok(rules) => rules.is_allowed(url.as_str(), &self.robots_agent),
            Err(e) => {
                debug!(error = %e, "treating URL as disallowed");
                false
            }
        }
    }

    /// Asks every task to wind down
    pub fn request_stop(&self) {
        if !self.stop.send_replace(true) {
            info!("stop requested, finishing in-flight requests");
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Receiver that flips to `true` on [`CrawlSession::request_stop`]
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }
}
