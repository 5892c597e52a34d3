//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `FetchState`: The fetch worker state machine for a single URL
//! - `DomainState`: Per-domain rate limiter, permits and cached robots.txt

mod domain_state;
mod fetch_state;

// Re-export main types
pub use domain_state::DomainState;
pub use fetch_state::FetchState;
