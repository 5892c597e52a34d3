use crate::config::types::{
    CheckpointConfig, Config, CrawlingConfig, PipelineConfig, PluginEntry, SiteConfig,
    SitemapConfig, UserAgentConfig,
};
use crate::url::{domain_allowed, CompiledPattern};
use crate::{ConfigError, ConfigResult};
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_name(&config.name)?;
    validate_site_config(&config.site)?;
    validate_crawling_config(&config.crawling)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_sitemap_config(&config.sitemap)?;
    validate_plugins(&config.plugins)?;
    Ok(())
}

fn validate_name(name: &str) -> ConfigResult<()> {
    if name.is_empty() {
        return Err(ConfigError::Validation("name cannot be empty".to_string()));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "name must contain only ASCII letters, digits, '-' and '_', got '{}'",
            name
        )));
    }

    Ok(())
}

/// Validates start URLs, the domain allow-list and path patterns
fn validate_site_config(site: &SiteConfig) -> ConfigResult<()> {
    if site.allowed_domains.is_empty() {
        return Err(ConfigError::Validation(
            "allowed_domains must list at least one domain".to_string(),
        ));
    }

    for domain in &site.allowed_domains {
        if domain.is_empty() || domain.contains('/') || domain.contains(':') {
            return Err(ConfigError::InvalidPattern(format!(
                "allowed domain '{}' must be a bare host name",
                domain
            )));
        }
    }

    if site.start_urls.is_empty() {
        return Err(ConfigError::Validation(
            "start_urls must contain at least one URL".to_string(),
        ));
    }

    for start in &site.start_urls {
        let url = Url::parse(start)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", start, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Start URL '{}' must use http or https",
                start
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Start URL '{}' has no host", start)))?;

        if !domain_allowed(host, &site.allowed_domains) {
            return Err(ConfigError::Validation(format!(
                "Start URL '{}' is outside allowed_domains",
                start
            )));
        }
    }

    for pattern in site.include.iter().chain(site.exclude.iter()) {
        CompiledPattern::compile(pattern)?;
    }

    Ok(())
}

const MAX_RETRIES: u32 = 20;
const MAX_RETRY_BACKOFF: f64 = 60.0;

/// Validates crawler limits
fn validate_crawling_config(config: &CrawlingConfig) -> ConfigResult<()> {
    if config.global_concurrent_requests < 1 {
        return Err(ConfigError::Validation(format!(
            "global_concurrent_requests must be >= 1, got {}",
            config.global_concurrent_requests
        )));
    }

    if config.per_domain_concurrent_requests < 1
        || config.per_domain_concurrent_requests > config.global_concurrent_requests
    {
        return Err(ConfigError::Validation(format!(
            "per_domain_concurrent_requests must be between 1 and global_concurrent_requests ({}), got {}",
            config.global_concurrent_requests, config.per_domain_concurrent_requests
        )));
    }

    if config.rate_limiter_burst_size < 1 {
        return Err(ConfigError::Validation(
            "rate_limiter_burst_size must be >= 1".to_string(),
        ));
    }

    if !(config.delay_between_requests >= 0.0) {
        return Err(ConfigError::Validation(format!(
            "delay_between_requests must be >= 0, got {}",
            config.delay_between_requests
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if !(1.0..=MAX_RETRY_BACKOFF).contains(&config.retry_backoff) {
        return Err(ConfigError::Validation(format!(
            "retry_backoff must be between 1.0 and {}, got {}",
            MAX_RETRY_BACKOFF, config.retry_backoff
        )));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if !(0.0..=1.0).contains(&config.retry_jitter) {
        return Err(ConfigError::Validation(format!(
            "retry_jitter must be between 0 and 1, got {}",
            config.retry_jitter
        )));
    }

    if !(config.max_page_size_mb > 0.0) {
        return Err(ConfigError::Validation(format!(
            "max_page_size_mb must be > 0, got {}",
            config.max_page_size_mb
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.memory_check_interval < 1 {
        return Err(ConfigError::Validation(
            "memory_check_interval must be >= 1".to_string(),
        ));
    }

    if !(config.memory_warn_percent > 0.0
        && config.memory_warn_percent <= config.memory_abort_percent
        && config.memory_abort_percent <= 100.0)
    {
        return Err(ConfigError::Validation(format!(
            "memory thresholds must satisfy 0 < warn <= abort <= 100, got warn {} and abort {}",
            config.memory_warn_percent, config.memory_abort_percent
        )));
    }

    if config.link_selectors.is_empty() {
        return Err(ConfigError::Validation(
            "link_selectors cannot be empty".to_string(),
        ));
    }

    for selector in &config.link_selectors {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid link selector '{}': {:?}", selector, e))
        })?;
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    // robots.txt product tokens only contain letters, '-' and '_'
    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only letters, hyphens and underscores, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    if let Some(email) = &config.contact_email {
        validate_email(email)?;
    }

    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> ConfigResult<()> {
    if config.checkpoint_file.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_file cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_interval_pages < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_interval_pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> ConfigResult<()> {
    if !(10..=1000).contains(&config.queue_maxsize) {
        return Err(ConfigError::Validation(format!(
            "queue_maxsize must be between 10 and 1000, got {}",
            config.queue_maxsize
        )));
    }

    if !(1..=4096).contains(&config.max_queue_memory_mb) {
        return Err(ConfigError::Validation(format!(
            "max_queue_memory_mb must be between 1 and 4096, got {}",
            config.max_queue_memory_mb
        )));
    }

    if config.process_workers == Some(0) {
        return Err(ConfigError::Validation(
            "process_workers must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_sitemap_config(config: &SitemapConfig) -> ConfigResult<()> {
    for sitemap in &config.urls {
        Url::parse(sitemap).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid sitemap URL '{}': {}", sitemap, e))
        })?;
    }

    Ok(())
}

fn validate_plugins(plugins: &[PluginEntry]) -> ConfigResult<()> {
    for entry in plugins {
        if !crate::plugins::is_registered(&entry.name) {
            return Err(ConfigError::Validation(format!(
                "Unknown plugin '{}'",
                entry.name
            )));
        }
    }
    Ok(())
}

/// Performs basic email validation
fn validate_email(email: &str) -> ConfigResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "Invalid contact_email: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathPattern;

    fn create_valid_config() -> Config {
        Config::new(
            "docs",
            vec!["https://docs.example.com/".to_string()],
            vec!["example.com".to_string()],
        )
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&create_valid_config()).is_ok());
    }

    #[test]
    fn test_invalid_name() {
        let mut config = create_valid_config();
        config.name = "my docs!".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));

        config.name = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_start_url_outside_allowed_domains() {
        let mut config = create_valid_config();
        config.site.start_urls = vec!["https://other.org/".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_start_url_subdomain_allowed() {
        let mut config = create_valid_config();
        config.site.start_urls = vec!["https://api.docs.example.com/".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_start_url_bad_scheme() {
        let mut config = create_valid_config();
        config.site.start_urls = vec!["ftp://example.com/".to_string()];
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_empty_allowed_domains() {
        let mut config = create_valid_config();
        config.site.allowed_domains.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_regex_pattern() {
        let mut config = create_valid_config();
        config.site.exclude.push(PathPattern::regex("(unclosed"));
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_per_domain_exceeds_global() {
        let mut config = create_valid_config();
        config.crawling.global_concurrent_requests = 4;
        config.crawling.per_domain_concurrent_requests = 8;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_jitter_out_of_range() {
        let mut config = create_valid_config();
        config.crawling.retry_jitter = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_backoff_below_one() {
        let mut config = create_valid_config();
        config.crawling.retry_backoff = 0.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = create_valid_config();
        config.crawling.retry_backoff = f64::INFINITY;
        assert!(validate(&config).is_err());

        let mut config = create_valid_config();
        config.crawling.max_retries = 21;
        assert!(validate(&config).is_err());

        let mut config = create_valid_config();
        config.crawling.max_retries = 20;
        config.crawling.retry_backoff = 60.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_memory_thresholds() {
        let mut config = create_valid_config();
        config.crawling.memory_warn_percent = 96.0;
        assert!(validate(&config).is_err());

        let mut config = create_valid_config();
        config.crawling.memory_abort_percent = 120.0;
        assert!(validate(&config).is_err());

        let mut config = create_valid_config();
        config.crawling.memory_check_interval = 0;
        assert!(validate(&config).is_err());

        let mut config = create_valid_config();
        config.crawling.memory_warn_percent = 50.0;
        config.crawling.memory_abort_percent = 50.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_sitemap_url() {
        let mut config = create_valid_config();
        config.sitemap.urls = vec!["::not a url::".to_string()];
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_zero_max_pages() {
        let mut config = create_valid_config();
        config.crawling.max_pages = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_link_selector() {
        let mut config = create_valid_config();
        config.crawling.link_selectors = vec!["a[href".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_crawler_name_with_digits_rejected() {
        let mut config = create_valid_config();
        config.user_agent.crawler_name = "Bot2000".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_queue_bounds() {
        let mut config = create_valid_config();
        config.pipeline.queue_maxsize = 5;
        assert!(validate(&config).is_err());

        config.pipeline.queue_maxsize = 100;
        config.pipeline.max_queue_memory_mb = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_plugin() {
        let mut config = create_valid_config();
        config.plugins.push(crate::config::PluginEntry {
            name: "does-not-exist".to_string(),
            enabled: true,
            options: toml::Table::new(),
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("admin@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@localhost").is_err());
    }
}
