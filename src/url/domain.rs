use url::Url;

/// Extracts the lowercase host name from a URL
///
/// # Examples
///
/// ```
/// use docsweep::url::extract_domain;
/// use url::Url;
///
/// let url = Url::parse("https://Docs.Example.com:8443/page").unwrap();
/// assert_eq!(extract_domain(&url), Some("docs.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|host| host.to_lowercase())
}

/// Key under which per-domain state (rate limits, permits, robots) is kept
///
/// This is the host plus any non-default port, so two servers on the same
/// machine but different ports are treated as separate sites.
pub fn domain_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Checks a host against the domain allow-list
///
/// An entry allows the host itself and any of its subdomains, so
/// `example.com` admits `docs.example.com` but not `notexample.com`.
/// A leading `*.` on an entry is accepted and means the same thing.
///
/// # Examples
///
/// ```
/// use docsweep::url::domain_allowed;
///
/// let allowed = vec!["example.com".to_string()];
/// assert!(domain_allowed("example.com", &allowed));
/// assert!(domain_allowed("api.v2.example.com", &allowed));
/// assert!(!domain_allowed("myexample.com", &allowed));
/// ```
pub fn domain_allowed(host: &str, allowed_domains: &[String]) -> bool {
    let host = host.to_lowercase();
    allowed_domains.iter().any(|entry| {
        let base = entry.strip_prefix("*.").unwrap_or(entry).to_lowercase();
        host == base || host.ends_with(&format!(".{}", base))
    })
}
