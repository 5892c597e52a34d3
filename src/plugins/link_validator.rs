//! Reports same-site links that never turned into fetched pages

use crate::output::{CrawlSummary, FetchedPage};
use crate::plugins::Plugin;
use crate::url::{canonical_key, domain_key};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tracing::{info, warn};

const DEFAULT_REPORT_LIMIT: usize = 20;

#[derive(Debug, Default)]
struct LinkGraph {
    fetched: HashSet<String>,
    /// target → first page that linked to it
    targets: BTreeMap<String, String>,
}

/// Link checker
///
/// Options:
/// - `report-limit` (integer, default 20): unresolved links logged individually
#[derive(Debug)]
pub struct LinkValidator {
    report_limit: usize,
    graph: Mutex<LinkGraph>,
}

impl LinkValidator {
    pub fn new(report_limit: usize) -> Self {
        Self {
            report_limit,
            graph: Mutex::new(LinkGraph::default()),
        }
    }

    pub fn from_options(options: &toml::Table) -> anyhow::Result<Self> {
        let report_limit = match options.get("report-limit") {
            None => DEFAULT_REPORT_LIMIT,
            Some(value) => value
                .as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| anyhow::anyhow!("report-limit must be a non-negative integer"))?,
        };
        Ok(Self::new(report_limit))
    }

    pub(crate) fn boxed(options: &toml::Table) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(Self::from_options(options)?))
    }

    /// Linked same-site URLs never fetched, with the page linking to them
    pub fn unresolved(&self) -> Vec<(String, String)> {
        let Ok(graph) = self.graph.lock() else {
            return Vec::new();
        };
        graph
            .targets
            .iter()
            .filter(|(target, _)| !graph.fetched.contains(*target))
            .map(|(target, source)| (target.clone(), source.clone()))
            .collect()
    }
}

impl Plugin for LinkValidator {
    fn name(&self) -> &str {
        "link-validator"
    }

    fn post_fetch(&self, page: &FetchedPage) -> anyhow::Result<()> {
        let site = domain_key(&page.url);
        let mut graph = self
            .graph
            .lock()
            .map_err(|_| anyhow::anyhow!("link graph lock poisoned"))?;

        for url in [&page.url, &page.final_url] {
            if let Ok(key) = canonical_key(url.as_str()) {
                graph.fetched.insert(key);
            }
        }

        for link in &page.links {
            let Ok(parsed) = url::Url::parse(link) else {
                continue;
            };
            if domain_key(&parsed) != site {
                continue;
            }
            if let Ok(key) = canonical_key(link) {
                graph
                    .targets
                    .entry(key)
                    .or_insert_with(|| page.url.to_string());
            }
        }
        Ok(())
    }

    fn post_crawl(&self, _summary: &CrawlSummary) -> anyhow::Result<()> {
        let unresolved = self.unresolved();
        for (target, source) in unresolved.iter().take(self.report_limit) {
            warn!(link = %target, found_on = %source, "link never fetched");
        }
        info!(unresolved = unresolved.len(), "link validation finished");
        Ok(())
    }
}
