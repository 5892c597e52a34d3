//! URL handling module for docsweep
//!
//! This module provides URL normalization, canonical dedup keys, domain
//! extraction and the include/exclude filter that decides which
//! discovered URLs enter the frontier.

mod domain;
mod normalize;
mod pattern;

pub use domain::{domain_allowed, domain_key, extract_domain};
pub use normalize::{canonical_key, canonicalize, normalize_url};
pub use pattern::{CompiledPattern, FilterDecision, UrlFilter};
