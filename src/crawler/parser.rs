//! HTML parser for extracting links and assets
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from the configured selectors and canonical links)
//! - Asset references (images, stylesheets, scripts)
//! - Page title

use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Links to follow, absolute, in document order (duplicates kept)
    pub links: Vec<String>,

    /// Asset URLs, absolute, deduplicated and sorted
    pub assets: Vec<String>,
}

/// Compiled link and asset selectors
///
/// Built once per session from `link-selectors`; invalid selectors are
/// rejected by configuration validation, and any that still fail to parse
/// here are dropped.
#[derive(Debug)]
pub struct LinkExtractor {
    link_selectors: Vec<Selector>,
    canonical: Option<Selector>,
    assets: Vec<(Selector, &'static str)>,
    title: Option<Selector>,
}

impl LinkExtractor {
    pub fn new(link_selectors: &[String]) -> Self {
        let link_selectors = link_selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect();
        let assets = [
            ("img[src]", "src"),
            ("link[rel='stylesheet'][href]", "href"),
            ("script[src]", "src"),
        ]
        .into_iter()
        .filter_map(|(sel, attr)| Selector::parse(sel).ok().map(|s| (s, attr)))
        .collect();

        Self {
            link_selectors,
            canonical: Selector::parse("link[rel='canonical'][href]").ok(),
            assets,
            title: Selector::parse("title").ok(),
        }
    }

    /// Parses HTML content and extracts links, assets and title
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - Elements matched by the configured selectors (`href`, else `src`)
    /// - `<link rel="canonical" href="...">`
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - `javascript:`, `mailto:`, `tel:` links
    /// - Data URIs and fragment-only links
    /// - Anything that does not resolve to http(s)
    ///
    /// # Example
    ///
    /// ```
    /// use docsweep::crawler::LinkExtractor;
    /// use url::Url;
    ///
    /// let extractor = LinkExtractor::new(&["a[href]".to_string()]);
    /// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
    /// let base_url = Url::parse("https://example.com/").unwrap();
    /// let parsed = extractor.parse(html, &base_url);
    /// assert_eq!(parsed.title, Some("Test".to_string()));
    /// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
    /// ```
    pub fn parse(&self, html: &str, base_url: &Url) -> ParsedPage {
        let document = Html::parse_document(html);
        ParsedPage {
            title: self.extract_title(&document),
            links: self.extract_links(&document, base_url),
            assets: self.extract_assets(&document, base_url),
        }
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        let selector = self.title.as_ref()?;
        document
            .select(selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn extract_links(&self, document: &Html, base_url: &Url) -> Vec<String> {
        let mut links = Vec::new();

        for selector in &self.link_selectors {
            for element in document.select(selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                let value = element.value();
                if let Some(href) = value.attr("href").or_else(|| value.attr("src")) {
                    if let Some(absolute_url) = resolve_link(href, base_url) {
                        links.push(absolute_url);
                    }
                }
            }
        }

        if let Some(canonical) = &self.canonical {
            for element in document.select(canonical) {
                if let Some(href) = element.value().attr("href") {
                    if let Some(absolute_url) = resolve_link(href, base_url) {
                        links.push(absolute_url);
                    }
                }
            }
        }

        links
    }

    fn extract_assets(&self, document: &Html, base_url: &Url) -> Vec<String> {
        let mut assets = BTreeSet::new();
        for (selector, attr) in &self.assets {
            for element in document.select(selector) {
                if let Some(value) = element.value().attr(attr) {
                    if let Some(absolute_url) = resolve_link(value, base_url) {
                        assets.insert(absolute_url);
                    }
                }
            }
        }
        assets.into_iter().collect()
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new(&["a[href]".to_string()])
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}
