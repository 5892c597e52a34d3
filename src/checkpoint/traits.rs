//! Checkpoint store trait and error types
//!
//! This module defines the interface shared by the JSON and SQLite
//! checkpoint backends.

use crate::checkpoint::{CheckpointMetadata, CrawlRecord, QueuedUrl};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Trait for checkpoint backend implementations
///
/// Records are keyed by canonical URL. A store is owned by the coordinator
/// and only touched from its task, so implementations need `Send` but not
/// `Sync`.
pub trait CheckpointStore: Send {
    // ===== Metadata =====

    /// Loads checkpoint metadata, if a checkpoint exists
    fn metadata(&self) -> CheckpointResult<Option<CheckpointMetadata>>;

    /// Checks whether the stored checkpoint belongs to this configuration
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Metadata exists and its fingerprint matches
    /// * `Ok(false)` - No checkpoint yet, or a different fingerprint
    fn is_resumable(&self, fingerprint: &str) -> CheckpointResult<bool> {
        Ok(self
            .metadata()?
            .map_or(false, |meta| meta.config_fingerprint == fingerprint))
    }

    /// Writes fresh metadata, keeping `created_at` if a checkpoint exists
    fn begin(&mut self, config_name: &str, fingerprint: &str) -> CheckpointResult<()>;

    /// Discards every record, the queue and the metadata
    fn reset(&mut self) -> CheckpointResult<()>;

    // ===== Records =====

    /// Loads every record, keyed by canonical URL
    fn load(&self) -> CheckpointResult<HashMap<String, CrawlRecord>>;

    /// Gets a single record
    fn get(&self, url: &str) -> CheckpointResult<Option<CrawlRecord>>;

    /// Upserts `records` and persists them
    ///
    /// # Arguments
    ///
    /// * `records` - Records changed since the previous save
    /// * `marker` - Terminal outcomes processed so far, stored in metadata
    fn save(&mut self, records: &[CrawlRecord], marker: u64) -> CheckpointResult<()>;

    // ===== Queue =====

    /// Replaces the persisted frontier snapshot
    fn save_queue(&mut self, queue: &[QueuedUrl]) -> CheckpointResult<()>;

    /// Loads the persisted frontier snapshot in order
    fn load_queue(&self) -> CheckpointResult<Vec<QueuedUrl>>;

    /// Location of the checkpoint on disk
    fn path(&self) -> &Path;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
