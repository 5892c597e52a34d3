use crate::{UrlError, UrlResult};
use url::Url;

/// Schemes the crawler will fetch
const SAFE_SCHEMES: &[&str] = &["http", "https"];

/// Parses a URL into the form used for the actual request
///
/// The fragment is dropped because it never reaches the server. The query
/// string is kept exactly as written; only the dedup key produced by
/// [`canonicalize`] sorts it.
///
/// # Arguments
///
/// * `url_str` - The URL string to parse
///
/// # Returns
///
/// * `Ok(Url)` - Parsed http(s) URL without fragment
/// * `Err(UrlError)` - Malformed URL, unsupported scheme or missing host
///
/// # Examples
///
/// ```
/// use docsweep::url::normalize_url;
///
/// let url = normalize_url("HTTPS://Docs.Example.COM:443/guide?b=2&a=1#intro").unwrap();
/// assert_eq!(url.as_str(), "https://docs.example.com/guide?b=2&a=1");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if !SAFE_SCHEMES.contains(&url.scheme()) {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Produces the canonical dedup key for a URL
///
/// Canonical form:
/// 1. Scheme and host lowercased (done by the `url` parser)
/// 2. Default ports (80 for http, 443 for https) removed
/// 3. Fragment removed
/// 4. Query parameters sorted by key (then value); an empty query is dropped
///
/// Two URLs that differ only in these respects share one frontier slot.
///
/// # Examples
///
/// ```
/// use docsweep::url::{canonicalize, normalize_url};
///
/// let a = normalize_url("http://EXAMPLE.com:80/p?z=1&a=2#top").unwrap();
/// let b = normalize_url("http://example.com/p?a=2&z=1").unwrap();
/// assert_eq!(canonicalize(&a), canonicalize(&b));
/// assert_eq!(canonicalize(&a), "http://example.com/p?a=2&z=1");
/// ```
pub fn canonicalize(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    // Url::parse already strips default ports, but a Url built with
    // set_port can still carry one
    if canonical.port() == default_port(canonical.scheme()) {
        let _ = canonical.set_port(None);
    }

    match canonical.query() {
        Some("") => canonical.set_query(None),
        Some(_) => {
            let mut pairs: Vec<(String, String)> = canonical
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.sort();
            canonical.query_pairs_mut().clear().extend_pairs(pairs);
        }
        None => {}
    }

    canonical.to_string()
}

/// Parses and canonicalizes in one step
pub fn canonical_key(url_str: &str) -> UrlResult<String> {
    normalize_url(url_str).map(|url| canonicalize(&url))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_scheme_and_host() {
        let url = normalize_url("HTTPS://EXAMPLE.COM/Page").unwrap();
        assert_eq!(canonicalize(&url), "https://example.com/Page");
    }

    #[test]
    fn test_default_ports_removed() {
        assert_eq!(
            canonical_key("http://example.com:80/a").unwrap(),
            "http://example.com/a"
        );
        assert_eq!(
            canonical_key("https://example.com:443/a").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_non_default_port_kept() {
        assert_eq!(
            canonical_key("http://example.com:8080/a").unwrap(),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn test_fragment_removed() {
        let url = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
        assert_eq!(canonicalize(&url), "https://example.com/page");
    }

    #[test]
    fn test_query_sorted_for_key_only() {
        let url = normalize_url("https://example.com/search?q=rust&a=1").unwrap();
        assert_eq!(url.query(), Some("q=rust&a=1"));
        assert_eq!(canonicalize(&url), "https://example.com/search?a=1&q=rust");
    }

    #[test]
    fn test_duplicate_keys_sorted_by_value() {
        assert_eq!(
            canonical_key("https://example.com/?tag=b&tag=a").unwrap(),
            "https://example.com/?tag=a&tag=b"
        );
    }

    #[test]
    fn test_empty_query_dropped() {
        assert_eq!(
            canonical_key("https://example.com/page?").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_empty_path_becomes_root() {
        assert_eq!(
            canonical_key("https://example.com").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_dot_segments_resolved() {
        assert_eq!(
            canonical_key("https://example.com/a/../b/./c").unwrap(),
            "https://example.com/b/c"
        );
    }

    #[test]
    fn test_trailing_slash_is_significant() {
        assert_ne!(
            canonical_key("https://example.com/docs/").unwrap(),
            canonical_key("https://example.com/docs").unwrap()
        );
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));

        let result = normalize_url("javascript:alert(1)");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_equivalent_urls_share_key() {
        let variants = [
            "https://Example.com/docs?b=2&a=1",
            "https://example.com:443/docs?a=1&b=2#x",
            "HTTPS://EXAMPLE.COM/docs?a=1&b=2",
        ];
        let keys: Vec<String> = variants
            .iter()
            .map(|u| canonical_key(u).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }
}
