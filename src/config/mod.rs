//! Configuration module for docsweep
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and computing the fingerprint used to guard checkpoint resumes.
//!
//! # Example
//!
//! ```no_run
//! use docsweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("docsweep.toml")).unwrap();
//! println!("Depth limit: {:?}", config.crawling.depth_limit);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BackendKind, CheckpointConfig, Config, CrawlingConfig, OutputConfig, PathPattern,
    PatternKind, PipelineConfig, PluginEntry, SiteConfig, SitemapConfig, UserAgentConfig,
};

pub use parser::{
    compute_config_fingerprint, load_config, load_config_with_fingerprint, parse_config,
};
pub use validation::validate;
