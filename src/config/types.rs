use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for a docsweep crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of the crawl, used in checkpoint metadata
    pub name: String,
    pub site: SiteConfig,
    #[serde(default)]
    pub crawling: CrawlingConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sitemap: SitemapConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl Config {
    /// Builds a configuration with every optional section at its default
    pub fn new(name: &str, start_urls: Vec<String>, allowed_domains: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            site: SiteConfig {
                start_urls,
                allowed_domains,
                include: Vec::new(),
                exclude: Vec::new(),
            },
            crawling: CrawlingConfig::default(),
            user_agent: UserAgentConfig::default(),
            checkpoint: CheckpointConfig::default(),
            pipeline: PipelineConfig::default(),
            sitemap: SitemapConfig::default(),
            output: OutputConfig::default(),
            plugins: Vec::new(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.directory)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.resolve_path(&self.output_dir())
    }
}

/// Which site to crawl and which of its paths are in bounds
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// URLs the crawl starts from (depth 0)
    #[serde(rename = "start-urls")]
    pub start_urls: Vec<String>,

    /// Hosts the crawl may visit; subdomains of an entry are allowed too
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,

    #[serde(default)]
    pub include: Vec<PathPattern>,

    #[serde(default)]
    pub exclude: Vec<PathPattern>,
}

/// A single include/exclude rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathPattern {
    pub pattern: String,
    #[serde(rename = "type", default)]
    pub kind: PatternKind,
}

impl PathPattern {
    pub fn prefix(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Prefix,
        }
    }

    pub fn glob(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Glob,
        }
    }

    pub fn regex(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: PatternKind::Regex,
        }
    }
}

/// How a [`PathPattern`] is matched against a URL path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Literal prefix of the path
    #[default]
    Prefix,
    /// Shell-style wildcard over the whole path
    Glob,
    /// Unanchored regular expression search
    Regex,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlingConfig {
    /// Maximum link depth from a start URL (None = unlimited)
    #[serde(rename = "depth-limit", default)]
    pub depth_limit: Option<u32>,

    /// Stop after this many pages completed (None = unlimited)
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u64>,

    /// Seconds between requests to the same domain at steady state
    #[serde(rename = "delay-between-requests", default = "default_delay")]
    pub delay_between_requests: f64,

    #[serde(
        rename = "global-concurrent-requests",
        default = "default_global_concurrency"
    )]
    pub global_concurrent_requests: usize,

    #[serde(
        rename = "per-domain-concurrent-requests",
        default = "default_per_domain_concurrency"
    )]
    pub per_domain_concurrent_requests: usize,

    /// Token bucket capacity per domain
    #[serde(rename = "rate-limiter-burst-size", default = "default_burst")]
    pub rate_limiter_burst_size: u32,

    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds
    #[serde(rename = "retry-backoff", default = "default_backoff")]
    pub retry_backoff: f64,

    /// Jitter factor in [0, 1] applied to each backoff delay
    #[serde(rename = "retry-jitter", default = "default_jitter")]
    pub retry_jitter: f64,

    #[serde(rename = "respect-robots-txt", default = "default_true")]
    pub respect_robots_txt: bool,

    /// Allow everything when robots.txt cannot be fetched
    #[serde(rename = "robots-fail-open", default = "default_true")]
    pub robots_fail_open: bool,

    #[serde(rename = "max-page-size-mb", default = "default_max_page_size")]
    pub max_page_size_mb: f64,

    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(rename = "request-timeout-secs", default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// CSS selectors whose `href` attributes are followed
    #[serde(rename = "link-selectors", default = "default_link_selectors")]
    pub link_selectors: Vec<String>,

    /// Sample process memory every N terminal outcomes
    #[serde(rename = "memory-check-interval", default = "default_memory_interval")]
    pub memory_check_interval: u64,

    /// Resident memory, as a percentage of system memory, that logs a warning
    #[serde(rename = "memory-warn-percent", default = "default_memory_warn")]
    pub memory_warn_percent: f64,

    /// Resident memory percentage that stops the crawl after a checkpoint save
    #[serde(rename = "memory-abort-percent", default = "default_memory_abort")]
    pub memory_abort_percent: f64,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            depth_limit: None,
            max_pages: None,
            delay_between_requests: default_delay(),
            global_concurrent_requests: default_global_concurrency(),
            per_domain_concurrent_requests: default_per_domain_concurrency(),
            rate_limiter_burst_size: default_burst(),
            max_retries: default_max_retries(),
            retry_backoff: default_backoff(),
            retry_jitter: default_jitter(),
            respect_robots_txt: true,
            robots_fail_open: true,
            max_page_size_mb: default_max_page_size(),
            max_redirects: default_max_redirects(),
            request_timeout_secs: default_timeout(),
            link_selectors: default_link_selectors(),
            memory_check_interval: default_memory_interval(),
            memory_warn_percent: default_memory_warn(),
            memory_abort_percent: default_memory_abort(),
        }
    }
}

impl CrawlingConfig {
    /// Maximum body size in bytes
    pub fn max_page_bytes(&self) -> u64 {
        (self.max_page_size_mb * 1024.0 * 1024.0) as u64
    }

    /// Steady-state token refill rate in tokens per second
    pub fn refill_rate(&self) -> f64 {
        if self.delay_between_requests > 0.0 {
            1.0 / self.delay_between_requests
        } else {
            1000.0
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email", default)]
    pub contact_email: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
            contact_email: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the full User-Agent header value
    ///
    /// Format: `Name/Version (+ContactURL; ContactEmail)`, with the
    /// parenthesized part omitted when no contact details are set.
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = [
            self.contact_url.as_ref().map(|u| format!("+{}", u)),
            self.contact_email.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}

/// Which checkpoint backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Choose by file extension (.db/.sqlite/.sqlite3 → sqlite)
    #[default]
    Auto,
    Json,
    Sqlite,
}

/// Checkpoint persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub backend: BackendKind,

    /// Checkpoint path, relative to the output directory unless absolute
    #[serde(rename = "checkpoint-file", default = "default_checkpoint_file")]
    pub checkpoint_file: String,

    /// Persist every N terminal outcomes
    #[serde(rename = "checkpoint-interval-pages", default = "default_interval")]
    pub checkpoint_interval_pages: u64,

    /// Revalidate completed pages with conditional requests on resume
    #[serde(rename = "detect-changes", default)]
    pub detect_changes: bool,

    #[serde(rename = "force-redownload-after-days", default)]
    pub force_redownload_after_days: Option<u32>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: BackendKind::Auto,
            checkpoint_file: default_checkpoint_file(),
            checkpoint_interval_pages: default_interval(),
            detect_changes: false,
            force_redownload_after_days: None,
        }
    }
}

impl CheckpointConfig {
    /// Resolves the checkpoint path against the output directory
    pub fn resolve_path(&self, output_dir: &Path) -> PathBuf {
        let path = Path::new(&self.checkpoint_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            output_dir.join(path)
        }
    }

    /// Resolves [`BackendKind::Auto`] for the given path
    pub fn effective_backend(&self, path: &Path) -> BackendKind {
        match self.backend {
            BackendKind::Auto => match path.extension().and_then(|e| e.to_str()) {
                Some("db") | Some("sqlite") | Some("sqlite3") => BackendKind::Sqlite,
                _ => BackendKind::Json,
            },
            other => other,
        }
    }
}

/// Producer/consumer pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Number of consumer tasks (None = min(10, available parallelism))
    #[serde(rename = "process-workers", default)]
    pub process_workers: Option<usize>,

    #[serde(rename = "queue-maxsize", default = "default_queue_maxsize")]
    pub queue_maxsize: usize,

    #[serde(rename = "max-queue-memory-mb", default = "default_queue_memory")]
    pub max_queue_memory_mb: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            process_workers: None,
            queue_maxsize: default_queue_maxsize(),
            max_queue_memory_mb: default_queue_memory(),
        }
    }
}

impl PipelineConfig {
    /// Number of consumers to start
    pub fn worker_count(&self) -> usize {
        self.process_workers.unwrap_or_else(|| {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cores.min(10)
        })
    }

    pub fn max_queue_memory_bytes(&self) -> u64 {
        self.max_queue_memory_mb * 1024 * 1024
    }
}

/// Sitemap seeding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SitemapConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Look for sitemaps in robots.txt and at /sitemap.xml
    #[serde(rename = "auto-discover", default = "default_true")]
    pub auto_discover: bool,

    #[serde(default)]
    pub urls: Vec<String>,

    /// Order the frontier by sitemap priority (highest first)
    #[serde(rename = "respect-priority", default)]
    pub respect_priority: bool,

    #[serde(rename = "max-urls", default)]
    pub max_urls: Option<usize>,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_discover: true,
            urls: Vec::new(),
            respect_priority: false,
            max_urls: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Base directory for saved pages and the checkpoint file
    #[serde(default = "default_output_dir")]
    pub directory: String,

    /// Write fetched pages to disk
    #[serde(rename = "save-pages", default = "default_true")]
    pub save_pages: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_pages: true,
        }
    }
}

/// A statically registered plugin enabled by name
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub options: toml::Table,
}

fn default_true() -> bool {
    true
}

fn default_delay() -> f64 {
    0.1
}

fn default_global_concurrency() -> usize {
    200
}

fn default_per_domain_concurrency() -> usize {
    25
}

fn default_burst() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.3
}

fn default_max_page_size() -> f64 {
    10.0
}

fn default_max_redirects() -> usize {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_link_selectors() -> Vec<String> {
    vec!["a[href]".to_string()]
}

fn default_memory_interval() -> u64 {
    1
}

fn default_memory_warn() -> f64 {
    80.0
}

fn default_memory_abort() -> f64 {
    95.0
}

fn default_crawler_name() -> String {
    "docsweep".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_checkpoint_file() -> String {
    ".docsweep_checkpoint.json".to_string()
}

fn default_interval() -> u64 {
    10
}

fn default_queue_maxsize() -> usize {
    100
}

fn default_queue_memory() -> u64 {
    500
}

fn default_output_dir() -> String {
    "output".to_string()
}
