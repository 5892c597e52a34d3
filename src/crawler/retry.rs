//! Retry policy with exponential backoff and jitter
//!
//! Failures are classified into a [`FailureKind`]. Transient and rate-limited
//! failures are retried up to `max_retries` times; permanent failures end the
//! fetch immediately. The delay before retry `n` (0-based) is
//!
//! ```text
//! delay(n) = base ^ n × (1 + jitter × uniform(-1, 1))
//! ```
//!
//! so with the defaults (base 2.0, jitter 0.3) retries wait roughly 1s, 2s,
//! then 4s.

use crate::config::CrawlingConfig;
use crate::crawler::fetcher::FetchError;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Longest wait between two attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Classification of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network errors, timeouts and 5xx responses
    Transient,
    /// HTTP 429; retried and also cools the domain down
    RateLimited,
    /// 4xx other than 429, oversize bodies, redirect loops
    Permanent,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Classifies a fetch error for retry purposes
pub fn classify(error: &FetchError) -> FailureKind {
    match error {
        FetchError::Http { status: 429, .. } => FailureKind::RateLimited,
        FetchError::Http { status, .. } if *status >= 500 => FailureKind::Transient,
        FetchError::Http { .. } => FailureKind::Permanent,
        FetchError::Timeout
        | FetchError::Connect(_)
        | FetchError::Network(_)
        | FetchError::Body(_) => FailureKind::Transient,
        FetchError::TooManyRedirects | FetchError::TooLarge { .. } | FetchError::Aborted(_) => {
            FailureKind::Permanent
        }
    }
}

/// Decision on whether to retry a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `attempt` (1-based)
    Retry { delay: Duration, attempt: u32 },
    DoNotRetry { reason: String },
}

/// Retry configuration for the fetch worker
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_backoff: f64,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: f64, jitter: f64) -> Self {
        Self {
            max_retries,
            base_backoff: base_backoff.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &CrawlingConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff, config.retry_jitter)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, the initial one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Backoff before retry `attempt` (0-based), with fresh random jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let r = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.delay_with(attempt, r)
    }

    /// Backoff for a given jitter sample `r` in [-1, 1], capped at [`MAX_BACKOFF`]
    pub fn delay_with(&self, attempt: u32, r: f64) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.base_backoff.powi(exponent);
        let secs = base * (1.0 + self.jitter * r.clamp(-1.0, 1.0));
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            return MAX_BACKOFF;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Decides what happens after a failed attempt
    ///
    /// # Arguments
    ///
    /// * `kind` - Classification of the failure
    /// * `attempts_made` - Attempts completed so far, the failed one included
    pub fn should_retry(&self, kind: FailureKind, attempts_made: u32) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if attempts_made >= self.max_attempts() {
            return RetryDecision::DoNotRetry {
                reason: format!("retries exhausted after {} attempts", attempts_made),
            };
        }

        let delay = self.delay(attempts_made.saturating_sub(1));
        debug!(
            attempt = attempts_made,
            delay_ms = delay.as_millis() as u64,
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempts_made + 1,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlingConfig::default())
    }
}
