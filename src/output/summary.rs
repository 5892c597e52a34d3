//! End-of-crawl summary
//!
//! Counts of completed, failed and skipped URLs, with failures grouped by
//! domain and error kind.

use crate::crawler::{ErrorKind, SkipReason};
use crate::output::events::{CrawlEvent, OutcomeStatus};
use crate::pipeline::PipelineStats;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Why the crawl stopped pulling from the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Frontier exhausted
    #[default]
    Exhausted,
    /// `max-pages` reached
    MaxPages,
    /// Stop requested (Ctrl-C or [`crate::CrawlSession::request_stop`])
    Interrupted,
    /// Process memory crossed `memory-abort-percent`
    HighMemory,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exhausted => "frontier exhausted",
            Self::MaxPages => "max pages reached",
            Self::Interrupted => "interrupted",
            Self::HighMemory => "memory limit reached",
        })
    }
}

/// Summary statistics for a crawl
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub name: String,

    // Outcome counts
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,

    /// domain → error kind → count
    pub failures: BTreeMap<String, BTreeMap<ErrorKind, u64>>,

    /// skip reason → count
    pub skip_reasons: BTreeMap<SkipReason, u64>,

    pub elapsed: Duration,
    pub stop_reason: StopReason,

    /// URLs still queued when the crawl ended
    pub frontier_remaining: usize,

    /// Highest number of simultaneous requests observed
    pub peak_in_flight: usize,

    /// A checkpoint write or load failed; resuming this run may redo work
    pub resume_degraded: bool,
    pub checkpoint_errors: u64,

    pub plugin_failures: u64,

    /// Set when the pipeline was used
    pub pipeline: Option<PipelineStats>,
}

impl CrawlSummary {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Folds one terminal outcome into the counts
    pub fn record(&mut self, event: &CrawlEvent) {
        match event.status {
            OutcomeStatus::Completed => self.completed += 1,
            OutcomeStatus::Failed => {
                self.failed += 1;
                if let Some(kind) = event.error_kind {
                    *self
                        .failures
                        .entry(event.domain.clone())
                        .or_default()
                        .entry(kind)
                        .or_insert(0) += 1;
                }
            }
            OutcomeStatus::Skipped => {
                self.skipped += 1;
                if let Some(reason) = event.skip_reason {
                    *self.skip_reasons.entry(reason).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }

    /// Failures recorded for a domain and error kind
    pub fn failures_for(&self, domain: &str, kind: ErrorKind) -> u64 {
        self.failures
            .get(domain)
            .and_then(|kinds| kinds.get(&kind))
            .copied()
            .unwrap_or(0)
    }

    pub fn pages_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Prints the summary to stdout in a formatted manner
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary: {} ===\n", summary.name);

    println!("Overview:");
    println!("  Completed: {}", summary.completed);
    println!("  Failed: {}", summary.failed);
    println!("  Skipped: {}", summary.skipped);
    println!(
        "  Duration: {:.1}s ({:.1} pages/sec)",
        summary.elapsed.as_secs_f64(),
        summary.pages_per_sec()
    );
    println!("  Stopped: {}", summary.stop_reason);
    if summary.frontier_remaining > 0 {
        println!("  Still queued: {}", summary.frontier_remaining);
    }
    println!("  Peak concurrent requests: {}", summary.peak_in_flight);
    println!();

    if !summary.failures.is_empty() {
        println!("Failures by Domain:");
        for (domain, kinds) in &summary.failures {
            let total: u64 = kinds.values().sum();
            println!("  {} ({}):", domain, total);
            let mut counts: Vec<_> = kinds.iter().collect();
            counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (kind, count) in counts {
                println!("    {}: {}", kind, count);
            }
        }
        println!();
    }

    if !summary.skip_reasons.is_empty() {
        println!("Skip Reasons:");
        for (reason, count) in &summary.skip_reasons {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if let Some(pipeline) = &summary.pipeline {
        println!("Pipeline:");
        println!("  Processed: {}", pipeline.processed);
        println!("  Processing errors: {}", pipeline.errors);
        println!("  Peak queue length: {}", pipeline.peak_len);
        println!(
            "  Peak queue memory: {:.1} MB",
            pipeline.peak_memory_bytes as f64 / (1024.0 * 1024.0)
        );
        println!("  Producer waits: {}", pipeline.producer_waits);
        println!();
    }

    if summary.plugin_failures > 0 {
        println!("Plugin hook failures: {}", summary.plugin_failures);
        println!();
    }

    if summary.resume_degraded {
        println!(
            "WARNING: {} checkpoint operation(s) failed; resuming this crawl may refetch pages.",
            summary.checkpoint_errors
        );
    }
}
