use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use docsweep::config::load_config;
///
/// let config = load_config(Path::new("docsweep.toml")).unwrap();
/// println!("Start URLs: {:?}", config.site.start_urls);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes the fingerprint that decides whether a checkpoint can be resumed
///
/// Only the settings that change *which* pages belong to the crawl are
/// hashed: name, start URLs, allowed domains, include/exclude patterns,
/// depth limit and link selectors. Tuning knobs like delays or concurrency
/// leave the fingerprint unchanged.
///
/// The input is serialized as JSON with sorted keys before hashing, so the
/// result is stable across runs.
///
/// # Returns
///
/// Hex-encoded SHA-256 digest (64 characters)
pub fn compute_config_fingerprint(config: &Config) -> String {
    // serde_json::Map is a BTreeMap, so keys come out sorted
    let canonical = serde_json::json!({
        "name": config.name,
        "start_urls": config.site.start_urls,
        "allowed_domains": config.site.allowed_domains,
        "include_patterns": config.site.include,
        "exclude_patterns": config.site.exclude,
        "depth_limit": config.crawling.depth_limit,
        "link_selectors": config.crawling.link_selectors,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its fingerprint
pub fn load_config_with_fingerprint(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let fingerprint = compute_config_fingerprint(&config);
    Ok((config, fingerprint))
}
