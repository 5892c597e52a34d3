//! Fetch worker states
//!
//! ```text
//! queued → permitted → fetching → succeeded
//!    │                    │ ├──→ retrying → permitted (after backoff)
//!    │                    │ └──→ failed      └──→ failed (stop during backoff)
//!    └──→ skipped         └────→ skipped (not modified, not HTML)
//! ```

use std::fmt;

/// Represents the current state of one URL inside the fetch worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    // ===== Active States =====
    /// Dequeued from the frontier, waiting for robots and permits
    Queued,

    /// Holding both concurrency permits and a rate-limiter token
    Permitted,

    /// HTTP request in progress
    Fetching,

    /// Backing off after a retryable failure; no permits held
    Retrying,

    // ===== Terminal States =====
    Succeeded,

    Failed,

    /// Not fetched (robots, already complete, size cap) or unchanged
    Skipped,
}

impl FetchState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Checks whether the worker may move from `self` to `next`
    pub fn can_transition_to(&self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Queued, Permitted)
                | (Queued, Skipped)
                | (Permitted, Fetching)
                | (Fetching, Succeeded)
                | (Fetching, Retrying)
                | (Fetching, Failed)
                | (Fetching, Skipped)
                | (Retrying, Permitted)
                | (Retrying, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Permitted => "permitted",
            Self::Fetching => "fetching",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
