//! Output module: what the crawler hands downstream
//!
//! This module handles:
//! - The [`FetchedPage`] passed to the conversion stage and plugins
//! - Page processors that convert and save pages
//! - Terminal-outcome events and progress reporting
//! - The end-of-crawl summary

mod events;
mod summary;
mod writer;

pub use events::{CrawlEvent, EventSink, MemoryEventSink, OutcomeStatus, Progress, TracingEventSink};
pub use summary::{print_summary, CrawlSummary, StopReason};
pub use writer::{HtmlFileWriter, NullProcessor, PageProcessor};

use crate::config::Config;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::borrow::Cow;
use std::sync::Arc;
use url::Url;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    pub depth: u32,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// SHA-256 of `body`, hex encoded
    pub content_hash: String,
    /// Outbound links, absolute
    pub links: Vec<String>,
    /// Asset URLs, deduplicated and sorted
    pub assets: Vec<String>,
    pub title: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FetchedPage {
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Approximate heap footprint while queued
    ///
    /// Body plus 5% for decoding overhead, plus headers and link strings.
    pub fn estimated_memory_bytes(&self) -> u64 {
        let body = (self.body.len() as f64 * 1.05) as u64;
        let headers: usize = self
            .headers
            .iter()
            .map(|(k, v)| k.as_str().len() + v.len())
            .sum();
        let links: usize = self
            .links
            .iter()
            .chain(self.assets.iter())
            .map(String::len)
            .sum();
        body + (headers + links) as u64
    }
}

/// Picks the processor for a configuration
pub fn processor_from_config(config: &Config) -> Arc<dyn PageProcessor> {
    if config.output.save_pages {
        Arc::new(HtmlFileWriter::new(&config.output_dir()))
    } else {
        Arc::new(NullProcessor)
    }
}

#[cfg(test)]
pub(crate) fn test_page(url: &str) -> FetchedPage {
    let url = Url::parse(url).unwrap();
    FetchedPage {
        final_url: url.clone(),
        url,
        depth: 0,
        status: 200,
        headers: HeaderMap::new(),
        body: b"<html>hi</html>".to_vec(),
        content_hash: "0".repeat(64),
        links: Vec::new(),
        assets: Vec::new(),
        title: None,
        fetched_at: Utc::now(),
        etag: None,
        last_modified: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_memory_includes_overhead() {
        let mut page = test_page("https://example.com/");
        page.body = vec![b'x'; 1000];
        assert_eq!(page.estimated_memory_bytes(), 1050);

        page.links.push("https://example.com/a".to_string());
        assert_eq!(page.estimated_memory_bytes(), 1050 + 21);
    }
}
