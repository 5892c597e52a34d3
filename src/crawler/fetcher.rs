//! HTTP fetcher implementation
//!
//! This module performs a single HTTP attempt for the fetch worker:
//! - Building the HTTP client with the configured user agent
//! - Conditional GET with stored validators
//! - Size-capped body streaming
//! - Error classification into [`FetchError`]
//!
//! Retrying, permits and rate limiting live in the worker.

use crate::config::Config;
use reqwest::header::{
    HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED, RETRY_AFTER,
};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::rate_limiter::parse_retry_after;

/// Why one fetch attempt failed
///
/// These never abort the crawl; they end up in the checkpoint record and
/// the summary.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("Fetch task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Classifies a reqwest transport error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_redirect() {
            Self::TooManyRedirects
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            Self::Body(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http { status: 429, .. } => ErrorKind::Http429,
            Self::Http { status, .. } if *status >= 500 => ErrorKind::Http5xx,
            Self::Http { status, .. } if *status >= 400 => ErrorKind::Http4xx,
            Self::Http { .. } => ErrorKind::HttpOther,
            Self::Timeout => ErrorKind::Timeout,
            Self::Connect(_) => ErrorKind::Connect,
            Self::Network(_) => ErrorKind::Network,
            Self::TooManyRedirects => ErrorKind::Redirect,
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::Body(_) => ErrorKind::Body,
            Self::Aborted(_) => ErrorKind::Internal,
        }
    }
}

/// Label used to group failures in events and the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Http5xx,
    Http4xx,
    Http429,
    /// Unexpected status outside 2xx/4xx/5xx, e.g. an unrequested 304
    HttpOther,
    Timeout,
    Connect,
    Network,
    Redirect,
    TooLarge,
    Body,
    /// The fetch task itself failed
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http5xx => "http_5xx",
            Self::Http4xx => "http_4xx",
            Self::Http429 => "http_429",
            Self::HttpOther => "http_other",
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Network => "network",
            Self::Redirect => "redirect",
            Self::TooLarge => "too_large",
            Self::Body => "body",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validators from a previous fetch, sent as conditional request headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A 2xx response read into memory
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn etag(&self) -> Option<String> {
        header_string(&self.headers, ETAG)
    }

    pub fn last_modified(&self) -> Option<String> {
        header_string(&self.headers, LAST_MODIFIED)
    }
}

/// Result of one successful HTTP exchange
#[derive(Debug)]
pub enum HttpOutcome {
    /// 2xx with an HTML body within the size cap
    Page(RawResponse),
    /// 304 in answer to a conditional request
    NotModified,
    /// Content-Length announced a body above the cap; nothing was read
    DeclaredTooLarge { length: u64 },
    /// The response is not HTML
    NotHtml { content_type: String },
}

/// Builds an HTTP client with proper configuration
///
/// The user agent has the form `Name/Version (+ContactURL; ContactEmail)`.
/// Redirects are followed up to `max-redirects` hops; exceeding that
/// surfaces as [`FetchError::TooManyRedirects`].
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use docsweep::config::Config;
/// use docsweep::crawler::build_http_client;
///
/// let config = Config::new(
///     "docs",
///     vec!["https://docs.example.com/".to_string()],
///     vec!["example.com".to_string()],
/// );
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.crawling.request_timeout_secs))
        .connect_timeout(Duration::from_secs(
            config.crawling.request_timeout_secs.min(10),
        ))
        .redirect(Policy::limited(config.crawling.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one GET request
///
/// # Request Flow
///
/// 1. Send GET, with `If-None-Match` / `If-Modified-Since` when validators are given
/// 2. 304 to a conditional request → [`HttpOutcome::NotModified`]
/// 3. Non-2xx → [`FetchError::Http`] (carrying `Retry-After` for 429/503)
/// 4. Non-HTML Content-Type → [`HttpOutcome::NotHtml`]
/// 5. Content-Length above `max_bytes` → [`HttpOutcome::DeclaredTooLarge`]
/// 6. Stream the body, failing with [`FetchError::TooLarge`] past `max_bytes`
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `validators` - Stored ETag / Last-Modified, if revalidating
/// * `max_bytes` - Body size cap
pub async fn fetch_once(
    client: &Client,
    url: &Url,
    validators: Option<&Validators>,
    max_bytes: u64,
) -> Result<HttpOutcome, FetchError> {
    let mut request = client.get(url.clone());
    if let Some(validators) = validators {
        if let Some(etag) = &validators.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let mut response = request
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(&e))?;

    let status = response.status();

    let conditional = validators.map_or(false, |v| !v.is_empty());
    if status == StatusCode::NOT_MODIFIED && conditional {
        return Ok(HttpOutcome::NotModified);
    }

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(FetchError::Http {
            status: status.as_u16(),
            retry_after,
        });
    }

    let content_type = header_string(response.headers(), CONTENT_TYPE).unwrap_or_default();
    if !is_html(&content_type) {
        return Ok(HttpOutcome::NotHtml { content_type });
    }

    if let Some(length) = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if length > max_bytes {
            return Ok(HttpOutcome::DeclaredTooLarge { length });
        }
    }

    let final_url = response.url().clone();
    let headers = response.headers().clone();

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::from_reqwest(&e))?
    {
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(FetchError::TooLarge { limit: max_bytes });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(HttpOutcome::Page(RawResponse {
        final_url,
        status: status.as_u16(),
        headers,
        body,
    }))
}

/// Content types accepted as pages; a missing header is accepted too
fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.is_empty()
        || content_type.contains("text/html")
        || content_type.contains("application/xhtml+xml")
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
