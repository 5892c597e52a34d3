//! Terminal-outcome events
//!
//! The coordinator emits one [`CrawlEvent`] per URL that reaches a terminal
//! state, plus a periodic [`Progress`] snapshot.

use crate::crawler::{ErrorKind, SkipReason};
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

/// Terminal status of one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    Completed,
    Failed,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One terminal outcome
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlEvent {
    pub url: String,
    pub domain: String,
    pub status: OutcomeStatus,
    pub attempts: u32,
    /// Set for failures
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Set for skips
    pub skip_reason: Option<SkipReason>,
}

/// Periodic progress snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub frontier: usize,
    pub in_flight: usize,
    pub pages_per_sec: f64,
}

/// Receiver of crawl events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &CrawlEvent);

    fn progress(&self, _progress: &Progress) {}
}

/// Logs events through `tracing`
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &CrawlEvent) {
        match event.status {
            OutcomeStatus::Completed => info!(
                url = %event.url,
                attempts = event.attempts,
                "completed"
            ),
            OutcomeStatus::Failed => warn!(
                url = %event.url,
                attempts = event.attempts,
                kind = event.error_kind.map(|k| k.as_str()).unwrap_or("unknown"),
                error = event.error.as_deref().unwrap_or(""),
                "failed"
            ),
            OutcomeStatus::Skipped => info!(
                url = %event.url,
                reason = event.skip_reason.map(|r| r.as_str()).unwrap_or("unknown"),
                "skipped"
            ),
        }
    }

    fn progress(&self, progress: &Progress) {
        info!(
            completed = progress.completed,
            failed = progress.failed,
            skipped = progress.skipped,
            frontier = progress.frontier,
            in_flight = progress.in_flight,
            "{:.1} pages/sec",
            progress.pages_per_sec
        );
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<CrawlEvent>>,
    progress_reports: Mutex<Vec<Progress>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CrawlEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn progress_reports(&self) -> Vec<Progress> {
        self.progress_reports
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Events for one status
    pub fn with_status(&self, status: OutcomeStatus) -> Vec<CrawlEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.status == status)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: &CrawlEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn progress(&self, progress: &Progress) {
        if let Ok(mut reports) = self.progress_reports.lock() {
            reports.push(*progress);
        }
    }
}
