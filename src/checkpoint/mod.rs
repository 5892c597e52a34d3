//! Checkpoint module for resumable crawls
//!
//! This module persists crawl progress so an interrupted crawl can resume:
//! - One [`CrawlRecord`] per canonical URL (status, hash, attempts, validators)
//! - Metadata with the configuration fingerprint that guards resumes
//! - A snapshot of the frontier queue
//!
//! Two backends implement [`CheckpointStore`]: a JSON document rewritten in
//! full on each save, and a SQLite database updated incrementally.

mod json;
mod schema;
mod sqlite;
mod traits;

pub use json::JsonCheckpoint;
pub use sqlite::SqliteCheckpoint;
pub use traits::{CheckpointError, CheckpointResult, CheckpointStore};

use crate::config::{BackendKind, CheckpointConfig};
use crate::crawler::Validators;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current on-disk format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Opens the configured checkpoint backend
///
/// # Arguments
///
/// * `config` - Checkpoint settings (backend choice)
/// * `path` - Resolved checkpoint path; parent directories are created
///
/// # Returns
///
/// * `Ok(Box<dyn CheckpointStore>)` - Opened (possibly empty) checkpoint
/// * `Err(CheckpointError)` - The file exists but cannot be read
pub fn open_checkpoint(
    config: &CheckpointConfig,
    path: &Path,
) -> CheckpointResult<Box<dyn CheckpointStore>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match config.effective_backend(path) {
        BackendKind::Sqlite => Ok(Box::new(SqliteCheckpoint::new(path)?)),
        BackendKind::Json | BackendKind::Auto => Ok(Box::new(JsonCheckpoint::open(path)?)),
    }
}

/// Status of a URL in the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}

impl RecordStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Persisted state of one URL
///
/// Created when the URL is first dequeued and updated in place on every
/// attempt; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    /// Canonical URL
    pub url: String,
    pub status: RecordStatus,
    /// SHA-256 of the body, hex encoded
    pub content_hash: Option<String>,
    pub last_attempted_at: DateTime<Utc>,
    /// Attempts in the latest fetch; at most `max_retries + 1`
    pub attempt_count: u32,
    pub last_error: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    /// Link depth, kept so pending records replay at the right depth
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub discovered_from: Option<String>,
}

impl CrawlRecord {
    /// A fresh pending record
    pub fn pending(url: &str, depth: u32, discovered_from: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            status: RecordStatus::Pending,
            content_hash: None,
            last_attempted_at: Utc::now(),
            attempt_count: 0,
            last_error: None,
            status_code: None,
            etag: None,
            last_modified: None,
            depth,
            discovered_from: discovered_from.map(str::to_string),
        }
    }

    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }
}

/// Checkpoint header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub version: u32,
    pub config_name: String,
    pub config_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Terminal outcomes processed when last saved
    #[serde(default)]
    pub progress_marker: u64,
}

impl CheckpointMetadata {
    pub fn new(config_name: &str, fingerprint: &str) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            config_name: config_name.to_string(),
            config_fingerprint: fingerprint.to_string(),
            created_at: now,
            last_updated: now,
            progress_marker: 0,
        }
    }
}

/// A frontier entry persisted in the checkpoint queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedUrl {
    pub url: String,
    pub depth: u32,
    pub discovered_from: Option<String>,
    #[serde(default)]
    pub priority: f64,
}

/// What to do with a URL that already has a checkpoint record
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeAction {
    /// Leave it alone
    Skip,
    /// Fetch it again from scratch
    Fetch,
    /// Fetch conditionally; unchanged content keeps the record completed
    Revalidate(Validators),
}

/// Decides how a recorded URL is treated on resume
///
/// | Record | Action |
/// |--------|--------|
/// | completed, hash present, older than `force_redownload_after_days` | fetch |
/// | completed, hash present, `detect_changes` | revalidate |
/// | completed, hash present | skip |
/// | completed without hash, pending, failed | fetch |
/// | skipped | skip |
pub fn resume_action(
    record: &CrawlRecord,
    config: &CheckpointConfig,
    now: DateTime<Utc>,
) -> ResumeAction {
    match record.status {
        RecordStatus::Completed if record.content_hash.is_some() => {
            if let Some(days) = config.force_redownload_after_days {
                if now - record.last_attempted_at >= Duration::days(i64::from(days)) {
                    return ResumeAction::Fetch;
                }
            }
            if config.detect_changes {
                ResumeAction::Revalidate(record.validators())
            } else {
                ResumeAction::Skip
            }
        }
        RecordStatus::Skipped => ResumeAction::Skip,
        RecordStatus::Completed | RecordStatus::Pending | RecordStatus::Failed => {
            ResumeAction::Fetch
        }
    }
}
