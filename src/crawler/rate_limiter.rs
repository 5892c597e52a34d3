//! Per-domain token bucket rate limiting
//!
//! Each domain owns one [`RateLimiter`]. A bucket holds up to `capacity`
//! tokens and refills continuously at `rate` tokens per second. Acquiring
//! never fails: when the bucket is empty the caller sleeps for the time it
//! takes one token to accumulate, then checks again. Waiters are not
//! queued, so under contention grant order is not strictly FIFO.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Maximum Retry-After value honored (1 hour)
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Longest single wait for a token, and the slowest pacing a crawl delay
/// can impose (one request per hour)
const MAX_TOKEN_WAIT: Duration = Duration::from_secs(3600);

/// Token bucket state
///
/// Pure bookkeeping: callers pass the current instant in, which keeps the
/// arithmetic testable without sleeping.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_refill: Instant,
    cooldown_until: Option<Instant>,
}

impl TokenBucket {
    /// Creates a full bucket
    ///
    /// # Arguments
    ///
    /// * `capacity` - Burst size; the bucket never holds more tokens than this
    /// * `rate` - Refill rate in tokens per second (must be > 0)
    pub fn new(capacity: u32, rate: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            rate,
            tokens: capacity,
            last_refill: now,
            cooldown_until: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token if available
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A token was consumed
    /// * `Err(wait)` - The bucket is empty (or cooling down); retry after `wait`
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return Err(until - now);
            }
            // Tokens only start accumulating again once the cooldown ends
            self.cooldown_until = None;
            self.last_refill = self.last_refill.max(until);
        }

        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(token_wait((1.0 - self.tokens) / self.rate))
        }
    }

    /// Empties the bucket and blocks grants for `duration`
    pub fn cooldown(&mut self, duration: Duration, now: Instant) {
        self.tokens = 0.0;
        self.last_refill = now;
        let until = now + duration;
        self.cooldown_until = Some(match self.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Lowers the refill rate so requests are at least `delay_secs` apart
    ///
    /// A crawl delay can only slow the domain down; a delay shorter than the
    /// configured pacing leaves the rate unchanged.
    pub fn apply_crawl_delay(&mut self, delay_secs: f64) {
        if !delay_secs.is_finite() || delay_secs <= 0.0 {
            return;
        }
        let delay_secs = delay_secs.min(MAX_TOKEN_WAIT.as_secs_f64());
        self.rate = self.rate.min(1.0 / delay_secs);
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Tokens currently available, after refilling up to `now`
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }
}

/// Converts a wait in seconds, saturating at [`MAX_TOKEN_WAIT`]
fn token_wait(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0))
        .unwrap_or(MAX_TOKEN_WAIT)
        .min(MAX_TOKEN_WAIT)
}

/// Async wrapper around a [`TokenBucket`] shared by all tasks of one domain
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, rate: f64) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(capacity, rate, Instant::now())),
        }
    }

    /// Waits until a token is available and consumes it
    ///
    /// The bucket lock is released while sleeping, so other domains and
    /// other callers are never blocked behind a sleeper.
    ///
    /// # Returns
    ///
    /// Total time spent waiting
    #[instrument(skip(self))]
    pub async fn acquire(&self, domain: &str) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_acquire(Instant::now()) {
                    Ok(()) => return waited,
                    Err(wait) => wait,
                }
            };

            debug!(
                domain = %domain,
                delay_ms = wait.as_millis() as u64,
                "rate limit reached, waiting for token"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Applies a server-requested cooldown (HTTP 429)
    pub async fn cooldown(&self, domain: &str, duration: Duration) {
        let mut bucket = self.bucket.lock().await;
        bucket.cooldown(duration, Instant::now());
        warn!(
            domain = %domain,
            delay_ms = duration.as_millis() as u64,
            "domain rate limited, cooling down"
        );
    }

    pub async fn apply_crawl_delay(&self, domain: &str, delay_secs: f64) {
        let mut bucket = self.bucket.lock().await;
        let before = bucket.rate();
        bucket.apply_crawl_delay(delay_secs);
        if bucket.rate() < before {
            debug!(
                domain = %domain,
                crawl_delay = delay_secs,
                "robots.txt crawl-delay lowers request rate"
            );
        }
    }

    pub async fn rate(&self) -> f64 {
        self.bucket.lock().await.rate()
    }
}

/// Parses a Retry-After header value into a Duration
///
/// Accepts integer seconds or an HTTP-date. Returns `None` for values that
/// cannot be parsed. Values above one hour are capped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use docsweep::crawler::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds as u64).min(MAX_RETRY_AFTER));
    }

    let date = httpdate::parse_http_date(header_value).ok()?;
    match date.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        // Date already passed
        Err(_) => Some(Duration::ZERO),
    }
}
