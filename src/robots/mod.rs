//! Robots.txt handling module
//!
//! This module fetches and parses robots.txt files. Each domain's file is
//! fetched at most once per [`crate::CrawlSession`]; the session caches the
//! resulting [`RobotsRules`] in the domain's state.

mod parser;

pub use parser::RobotsRules;

use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Timeout for a robots.txt request
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Location of robots.txt for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}

/// Fetches robots.txt for the origin of a URL
///
/// | Response | Rules |
/// |----------|-------|
/// | 2xx | parsed content |
/// | 4xx | allow all (no robots.txt) |
/// | 5xx or network error | allow all if `fail_open`, otherwise disallow all |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - Any URL on the target origin
/// * `fail_open` - Policy when robots.txt cannot be retrieved
#[instrument(skip(client))]
pub async fn fetch_robots(client: &Client, url: &Url, fail_open: bool) -> RobotsRules {
    let Some(robots_url) = robots_url(url) else {
        return RobotsRules::allow_all();
    };

    let fallback = |reason: String| {
        if fail_open {
            warn!(%robots_url, %reason, "robots.txt unavailable, allowing all");
            RobotsRules::allow_all()
        } else {
            warn!(%robots_url, %reason, "robots.txt unavailable, disallowing all");
            RobotsRules::disallow_all()
        }
    };

    let response = match client
        .get(robots_url.clone())
        .timeout(ROBOTS_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return fallback(e.to_string()),
    };

    let status = response.status();
    if status.is_success() {
        match response.text().await {
            Ok(body) => {
                debug!(%robots_url, bytes = body.len(), "loaded robots.txt");
                RobotsRules::from_content(&body)
            }
            Err(e) => fallback(e.to_string()),
        }
    } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        info!(%robots_url, status = status.as_u16(), "no robots.txt, allowing all");
        RobotsRules::allow_all()
    } else {
        fallback(format!("HTTP {}", status.as_u16()))
    }
}
