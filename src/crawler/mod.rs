//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The URL frontier and HTML link extraction
//! - Token-bucket rate limiting and dual concurrency permits
//! - HTTP fetching with retry and backoff
//! - Sitemap discovery
//! - Process memory checks
//! - Overall crawl coordination

mod concurrency;
mod coordinator;
mod fetcher;
mod frontier;
mod memory;
mod parser;
mod rate_limiter;
mod retry;
mod sitemap;
mod worker;

pub use concurrency::{acquire_both, FetchPermit, PermitPool};
pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    build_http_client, fetch_once, ErrorKind, FetchError, HttpOutcome, RawResponse, Validators,
};
pub use frontier::{Frontier, FrontierEntry, FrontierStats};
pub use memory::{MemoryLevel, MemoryReader, MemorySample, MemoryWatch, SystemMemory};
pub use parser::{LinkExtractor, ParsedPage};
pub use rate_limiter::{parse_retry_after, RateLimiter, TokenBucket};
pub use retry::{classify, FailureKind, RetryDecision, RetryPolicy};
pub use sitemap::{
    collect_entries, discover_sitemaps, parse_sitemap, SitemapDocument, SitemapEntry,
};
pub use worker::{run_fetch, FetchOutcome, FetchReport, SkipReason};
