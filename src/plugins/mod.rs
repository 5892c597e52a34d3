//! Plugin hooks
//!
//! Plugins are compiled in and enabled by name from `[[plugins]]`. The
//! [`PluginManager`] runs each hook over its plugins in configuration order;
//! a failing hook is logged and counted but never stops the crawl.

mod link_validator;

pub use link_validator::LinkValidator;

use crate::config::{Config, PluginEntry};
use crate::output::{CrawlSummary, FetchedPage};
use crate::ConfigError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// What plugins see before the crawl starts
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub name: String,
    pub start_urls: Vec<String>,
    pub output_dir: PathBuf,
}

impl PluginContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.name.clone(),
            start_urls: config.site.start_urls.clone(),
            output_dir: config.output_dir(),
        }
    }
}

/// Lifecycle hooks; every hook defaults to a no-op
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn pre_crawl(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_fetch(&self, _page: &FetchedPage) -> anyhow::Result<()> {
        Ok(())
    }

    /// May rewrite converted content
    fn post_convert(&self, _page: &FetchedPage, content: String) -> anyhow::Result<String> {
        Ok(content)
    }

    fn post_save(&self, _page: &FetchedPage, _path: Option<&Path>) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_crawl(&self, _summary: &CrawlSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

type Constructor = fn(&toml::Table) -> anyhow::Result<Box<dyn Plugin>>;

/// Built-in plugins by configuration name
const REGISTRY: &[(&str, Constructor)] = &[("link-validator", LinkValidator::boxed)];

/// Checks whether a plugin name can be enabled
pub fn is_registered(name: &str) -> bool {
    REGISTRY.iter().any(|(registered, _)| *registered == name)
}

/// Builds the enabled plugins, in configuration order
///
/// # Errors
///
/// `ConfigError::Validation` for an unknown name or rejected options.
pub fn from_config(config: &Config) -> Result<PluginManager, ConfigError> {
    let mut manager = PluginManager::new();
    for entry in config.plugins.iter().filter(|p| p.enabled) {
        manager.register(construct(entry)?);
    }
    Ok(manager)
}

fn construct(entry: &PluginEntry) -> Result<Box<dyn Plugin>, ConfigError> {
    let (_, constructor) = REGISTRY
        .iter()
        .find(|(name, _)| *name == entry.name)
        .ok_or_else(|| {
            ConfigError::Validation(format!("plugins: unknown plugin '{}'", entry.name))
        })?;
    constructor(&entry.options).map_err(|e| {
        ConfigError::Validation(format!("plugins.{}: {}", entry.name, e))
    })
}

/// Ordered plugin list with failure isolation
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    failures: AtomicU64,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.names())
            .field("failures", &self.failures())
            .finish()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "plugin registered");
        self.plugins.push(plugin);
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Hook calls that returned an error so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn report(&self, plugin: &dyn Plugin, hook: &str, error: anyhow::Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(plugin = plugin.name(), hook, error = %error, "plugin hook failed");
    }

    pub fn pre_crawl(&self, ctx: &PluginContext) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.pre_crawl(ctx) {
                self.report(plugin.as_ref(), "pre_crawl", e);
            }
        }
    }

    pub fn post_fetch(&self, page: &FetchedPage) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.post_fetch(page) {
                self.report(plugin.as_ref(), "post_fetch", e);
            }
        }
    }

    /// Threads content through every plugin; a failure keeps the input
    pub fn post_convert(&self, page: &FetchedPage, mut content: String) -> String {
        for plugin in &self.plugins {
            match plugin.post_convert(page, content.clone()) {
                Ok(rewritten) => content = rewritten,
                Err(e) => self.report(plugin.as_ref(), "post_convert", e),
            }
        }
        content
    }

    pub fn post_save(&self, page: &FetchedPage, path: Option<&Path>) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.post_save(page, path) {
                self.report(plugin.as_ref(), "post_save", e);
            }
        }
    }

    pub fn post_crawl(&self, summary: &CrawlSummary) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.post_crawl(summary) {
                self.report(plugin.as_ref(), "post_crawl", e);
            }
        }
    }
}
