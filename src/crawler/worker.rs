//! Fetch worker: one URL from dequeue to terminal outcome
//!
//! The worker walks the [`FetchState`] machine explicitly. Robots.txt is
//! checked before any permit is taken; every attempt acquires both
//! concurrency permits and a rate-limiter token afresh, and the permits are
//! released before a backoff sleep.

use crate::crawler::fetcher::{fetch_once, FetchError, HttpOutcome, RawResponse, Validators};
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::retry::{classify, FailureKind, RetryDecision};
use crate::output::FetchedPage;
use crate::session::CrawlSession;
use crate::state::FetchState;
use crate::url::domain_key;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Why a URL ended without a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    RobotsDisallowed,
    /// The checkpoint already holds a completed record
    AlreadyCompleted,
    /// Content-Length announced a body above the size cap
    TooLarge,
    NotHtml,
    /// 304, or the same content hash as the stored record
    Unchanged,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots_disallowed",
            Self::AlreadyCompleted => "already_completed",
            Self::TooLarge => "too_large",
            Self::NotHtml => "not_html",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one fetch
#[derive(Debug)]
pub enum FetchOutcome {
    Succeeded(FetchedPage),
    Failed { error: FetchError, attempts: u32 },
    Skipped { reason: SkipReason },
}

impl FetchOutcome {
    pub fn state(&self) -> FetchState {
        match self {
            Self::Succeeded(_) => FetchState::Succeeded,
            Self::Failed { .. } => FetchState::Failed,
            Self::Skipped { .. } => FetchState::Skipped,
        }
    }
}

/// Outcome plus the path the worker took to reach it
#[derive(Debug)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    /// HTTP attempts made
    pub attempts: u32,
    pub transitions: Vec<FetchState>,
}

struct StateTrail {
    current: FetchState,
    visited: Vec<FetchState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            current: FetchState::Queued,
            visited: vec![FetchState::Queued],
        }
    }

    fn advance(&mut self, next: FetchState) {
        debug_assert!(
            self.current.can_transition_to(next),
            "invalid fetch transition {} -> {}",
            self.current,
            next
        );
        self.current = next;
        self.visited.push(next);
    }

    fn finish(mut self, outcome: FetchOutcome, attempts: u32) -> FetchReport {
        self.advance(outcome.state());
        FetchReport {
            outcome,
            attempts,
            transitions: self.visited,
        }
    }
}

/// Fetches one frontier entry
///
/// # Arguments
///
/// * `session` - The crawl session (permits, limiters, robots cache)
/// * `entry` - The dequeued URL
/// * `validators` - Stored ETag / Last-Modified when revalidating
/// * `previous_hash` - Stored content hash when revalidating; an identical
///   body ends as [`SkipReason::Unchanged`]
///
/// # Returns
///
/// A [`FetchReport`]; fetch failures are data, never an `Err`.
#[instrument(skip_all, fields(url = %entry.url, depth = entry.depth))]
pub async fn run_fetch(
    session: &CrawlSession,
    entry: &FrontierEntry,
    validators: Option<Validators>,
    previous_hash: Option<&str>,
) -> FetchReport {
    let mut trail = StateTrail::new();
    let host = domain_key(&entry.url).unwrap_or_default();

    if !session.robots_allows(&entry.url).await {
        debug!("disallowed by robots.txt");
        return trail.finish(
            FetchOutcome::Skipped {
                reason: SkipReason::RobotsDisallowed,
            },
            0,
        );
    }

    let max_bytes = session.config().crawling.max_page_bytes();
    let validators = validators.filter(|v| !v.is_empty());
    let mut stop = session.stop_signal();
    let mut attempt: u32 = 0;

    loop {
        let permit = match session.acquire_permits(&host).await {
            Ok(permit) => permit,
            Err(_) => {
                let error = FetchError::Network("concurrency pool closed".to_string());
                return trail.finish(FetchOutcome::Failed { error, attempts: attempt }, attempt);
            }
        };
        session.acquire_token(&host).await;
        trail.advance(FetchState::Permitted);

        attempt += 1;
        trail.advance(FetchState::Fetching);
        let result = fetch_once(session.client(), &entry.url, validators.as_ref(), max_bytes).await;
        drop(permit);

        let error = match result {
            Ok(HttpOutcome::Page(raw)) => {
                let page = build_page(session, entry, raw);
                if previous_hash == Some(page.content_hash.as_str()) {
                    debug!("content hash unchanged");
                    return trail.finish(
                        FetchOutcome::Skipped {
                            reason: SkipReason::Unchanged,
                        },
                        attempt,
                    );
                }
                debug!(status = page.status, links = page.links.len(), "page fetched");
                return trail.finish(FetchOutcome::Succeeded(page), attempt);
            }
            Ok(HttpOutcome::NotModified) => {
                debug!("not modified");
                return trail.finish(
                    FetchOutcome::Skipped {
                        reason: SkipReason::Unchanged,
                    },
                    attempt,
                );
            }
            Ok(HttpOutcome::DeclaredTooLarge { length }) => {
                debug!(length, limit = max_bytes, "declared body exceeds size cap");
                return trail.finish(
                    FetchOutcome::Skipped {
                        reason: SkipReason::TooLarge,
                    },
                    attempt,
                );
            }
            Ok(HttpOutcome::NotHtml { content_type }) => {
                debug!(content_type = %content_type, "not an HTML page");
                return trail.finish(
                    FetchOutcome::Skipped {
                        reason: SkipReason::NotHtml,
                    },
                    attempt,
                );
            }
            Err(error) => error,
        };

        let kind = classify(&error);
        if kind == FailureKind::RateLimited {
            let cooldown = match &error {
                FetchError::Http {
                    retry_after: Some(after),
                    ..
                } => *after,
                _ => session.retry_policy().delay(attempt.saturating_sub(1)),
            };
            session.domain(&host).limiter.cooldown(&host, cooldown).await;
        }

        match session.retry_policy().should_retry(kind, attempt) {
            RetryDecision::Retry { delay, .. } => {
                trail.advance(FetchState::Retrying);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, backing off"
                );
                if !backoff(delay, &mut stop).await {
                    debug!("stop requested during backoff");
                    return trail.finish(FetchOutcome::Failed { error, attempts: attempt }, attempt);
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(attempts = attempt, error = %error, reason = %reason, "fetch failed");
                return trail.finish(FetchOutcome::Failed { error, attempts: attempt }, attempt);
            }
        }
    }
}

/// Sleeps for `delay` unless the session stops first
///
/// Returns false if the stop signal fired.
async fn backoff(delay: Duration, stop: &mut tokio::sync::watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = stop.wait_for(|stopping| *stopping) => changed.is_err(),
    }
}

fn build_page(session: &CrawlSession, entry: &FrontierEntry, raw: RawResponse) -> FetchedPage {
    let content_hash = hex::encode(Sha256::digest(&raw.body));
    let parsed = session
        .extractor()
        .parse(&String::from_utf8_lossy(&raw.body), &raw.final_url);
    let etag = raw.etag();
    let last_modified = raw.last_modified();

    FetchedPage {
        url: entry.url.clone(),
        final_url: raw.final_url,
        depth: entry.depth,
        status: raw.status,
        headers: raw.headers,
        body: raw.body,
        content_hash,
        links: parsed.links,
        assets: parsed.assets,
        title: parsed.title,
        fetched_at: Utc::now(),
        etag,
        last_modified,
    }
}
