//! Sitemap seeding
//!
//! Sitemaps come from robots.txt `Sitemap:` lines, `/sitemap.xml` at the
//! site root, and explicitly configured URLs. Index sitemaps are followed
//! with a visited set so circular references terminate. Anything
//! unreachable or malformed is logged and skipped. Every sitemap request
//! takes the same permits and rate-limiter token as a page fetch.

use crate::crawler::FetchPermit;
use crate::robots::RobotsRules;
use crate::session::CrawlSession;
use crate::url::domain_key;
use anyhow::Context;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const SITEMAP_TIMEOUT: Duration = Duration::from_secs(30);

/// One `<url>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    /// `<priority>` if present and within 0.0..=1.0
    pub priority: Option<f64>,
    pub lastmod: Option<String>,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    /// `<urlset>`: page entries
    UrlSet(Vec<SitemapEntry>),
    /// `<sitemapindex>`: child sitemap locations
    Index(Vec<String>),
}

/// Parses sitemap XML
///
/// Tag matching is done with `scraper`, which lowercases element names and
/// ignores namespaces, so both namespaced and bare documents parse.
///
/// # Returns
///
/// `None` if the document is neither a `<urlset>` nor a `<sitemapindex>`
pub fn parse_sitemap(xml: &str) -> Option<SitemapDocument> {
    let document = Html::parse_document(xml);
    let select = |s: &str| Selector::parse(s).ok();

    let index = select("sitemapindex")?;
    if document.select(&index).next().is_some() {
        let loc = select("sitemap > loc")?;
        let children = document
            .select(&loc)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Some(SitemapDocument::Index(children));
    }

    let urlset = select("urlset")?;
    if document.select(&urlset).next().is_none() {
        return None;
    }

    let url_sel = select("url")?;
    let loc_sel = select("loc")?;
    let priority_sel = select("priority")?;
    let lastmod_sel = select("lastmod")?;
    let text_of = |el: scraper::ElementRef<'_>, sel: &Selector| {
        el.select(sel)
            .next()
            .map(|child| child.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let entries = document
        .select(&url_sel)
        .filter_map(|url_el| {
            let loc = text_of(url_el, &loc_sel)?;
            let priority = text_of(url_el, &priority_sel)
                .and_then(|p| p.parse::<f64>().ok())
                .filter(|p| (0.0..=1.0).contains(p));
            Some(SitemapEntry {
                loc,
                priority,
                lastmod: text_of(url_el, &lastmod_sel),
            })
        })
        .collect();

    Some(SitemapDocument::UrlSet(entries))
}

/// Finds sitemap URLs for a site
///
/// Combines the `Sitemap:` lines of the cached robots.txt with
/// `/sitemap.xml` when a HEAD request for it succeeds.
pub async fn discover_sitemaps(
    session: &CrawlSession,
    site: &Url,
    robots: &RobotsRules,
) -> Vec<Url> {
    let mut found: Vec<Url> = robots
        .sitemaps()
        .into_iter()
        .filter_map(|s| site.join(&s).ok())
        .collect();

    if let Ok(default) = site.join("/sitemap.xml") {
        if !found.contains(&default) {
            match head_status(session, &default).await {
                Ok(status) if status.is_success() => found.push(default),
                Ok(status) => debug!(url = %default, status = status.as_u16(), "No sitemap"),
                Err(e) => debug!(url = %default, error = %e, "No sitemap"),
            }
        }
    }

    found
}

/// Fetches sitemaps and flattens them into page entries
///
/// # Arguments
///
/// * `session` - Crawl session whose client, permits and limiters are used
/// * `roots` - Sitemap URLs to start from
/// * `max_urls` - Stop after this many entries
pub async fn collect_entries(
    session: &CrawlSession,
    roots: Vec<Url>,
    max_urls: Option<usize>,
) -> Vec<SitemapEntry> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut pending: VecDeque<Url> = roots.into();
    let mut entries = Vec::new();
    let limit = max_urls.unwrap_or(usize::MAX);

    while let Some(sitemap_url) = pending.pop_front() {
        if entries.len() >= limit {
            break;
        }
        if !visited.insert(sitemap_url.to_string()) {
            warn!(url = %sitemap_url, "Circular sitemap reference skipped");
            continue;
        }
        if sitemap_url.path().ends_with(".gz") {
            warn!(url = %sitemap_url, "Compressed sitemaps are not supported, skipping");
            continue;
        }

        let body = match fetch_text(session, &sitemap_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %sitemap_url, error = %e, "Failed to fetch sitemap");
                continue;
            }
        };

        match parse_sitemap(&body) {
            Some(SitemapDocument::Index(children)) => {
                debug!(url = %sitemap_url, children = children.len(), "Sitemap index");
                pending.extend(children.iter().filter_map(|c| sitemap_url.join(c).ok()));
            }
            Some(SitemapDocument::UrlSet(urls)) => {
                let take = limit.saturating_sub(entries.len());
                entries.extend(urls.into_iter().take(take));
            }
            None => warn!(url = %sitemap_url, "Malformed sitemap skipped"),
        }
    }

    info!(entries = entries.len(), sitemaps = visited.len(), "Sitemaps collected");
    entries
}

/// Takes the global and domain permits, then a token for the URL's domain
async fn pace(session: &CrawlSession, url: &Url) -> anyhow::Result<FetchPermit> {
    let host = domain_key(url).context("sitemap URL has no host")?;
    let permit = session.acquire_permits(&host).await?;
    session.acquire_token(&host).await;
    Ok(permit)
}

async fn head_status(session: &CrawlSession, url: &Url) -> anyhow::Result<reqwest::StatusCode> {
    let _permit = pace(session, url).await?;
    let resp = session
        .client()
        .head(url.clone())
        .timeout(SITEMAP_TIMEOUT)
        .send()
        .await?;
    Ok(resp.status())
}

async fn fetch_text(session: &CrawlSession, url: &Url) -> anyhow::Result<String> {
    let _permit = pace(session, url).await?;
    let body = session
        .client()
        .get(url.clone())
        .timeout(SITEMAP_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}
