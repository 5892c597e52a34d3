//! docsweep: a polite, resumable documentation crawler
//!
//! This crate discovers pages within a bounded set of domains, fetches them
//! under per-domain rate limits and dual concurrency caps, retries transient
//! failures with jittered backoff, honors robots.txt, and persists progress
//! to a checkpoint so an interrupted crawl can resume where it stopped.
//! Fetched pages are handed to a [`output::PageProcessor`], either inline or
//! through a memory-bounded producer/consumer pipeline.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod output;
pub mod pipeline;
pub mod plugins;
pub mod robots;
pub mod session;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for docsweep operations
///
/// Only configuration and resource errors surface here. Per-page failures
/// are [`crawler::FetchError`] values recorded in the checkpoint and summary.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error(
        "Checkpoint was written for a different configuration (stored {stored}, current {current}); \
         rerun with --reset-checkpoint to discard it"
    )]
    FingerprintMismatch { stored: String, current: String },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Robots.txt error: {0}")]
    Robots(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for docsweep operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration loading and validation
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL normalization
pub type UrlResult<T> = std::result::Result<T, UrlError>;

pub use checkpoint::CheckpointResult;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, FetchOutcome};
pub use output::{CrawlSummary, FetchedPage};
pub use session::CrawlSession;
pub use state::{DomainState, FetchState};
pub use url::{canonicalize, extract_domain, normalize_url};
