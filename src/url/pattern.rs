//! Include/exclude path patterns and the combined URL filter

use crate::config::{PathPattern, PatternKind, SiteConfig};
use crate::url::domain::domain_allowed;
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use url::Url;

/// A [`PathPattern`] compiled once for repeated matching
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: PathPattern,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Prefix(String),
    Regex(Regex),
}

impl CompiledPattern {
    /// Compiles a pattern, rejecting invalid regex syntax
    pub fn compile(pattern: &PathPattern) -> ConfigResult<Self> {
        let matcher = match pattern.kind {
            PatternKind::Prefix => Matcher::Prefix(pattern.pattern.clone()),
            PatternKind::Glob => {
                Matcher::Regex(build_regex(&glob_to_regex(&pattern.pattern), pattern)?)
            }
            PatternKind::Regex => Matcher::Regex(build_regex(&pattern.pattern, pattern)?),
        };

        Ok(Self {
            source: pattern.clone(),
            matcher,
        })
    }

    /// Tests the pattern against a URL path
    ///
    /// Prefix patterns compare literally, glob patterns must cover the
    /// whole path, regex patterns search anywhere unless anchored.
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Matcher::Regex(re) => re.is_match(path),
        }
    }

    pub fn source(&self) -> &PathPattern {
        &self.source
    }
}

fn build_regex(expr: &str, pattern: &PathPattern) -> ConfigResult<Regex> {
    Regex::new(expr).map_err(|e| {
        ConfigError::InvalidPattern(format!(
            "Invalid {:?} pattern '{}': {}",
            pattern.kind, pattern.pattern, e
        ))
    })
}

/// Translates a shell-style glob into an anchored regular expression
///
/// `*` matches any run of characters (including `/`), `?` a single
/// character, and `[...]` / `[!...]` character classes.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Find the closing bracket; a lone '[' is literal
                match chars[i + 1..].iter().position(|&c| c == ']') {
                    Some(offset) if offset > 0 => {
                        let class: String = chars[i + 1..i + 1 + offset].iter().collect();
                        out.push('[');
                        if let Some(rest) = class.strip_prefix('!') {
                            out.push('^');
                            out.push_str(&rest.replace('\\', "\\\\"));
                        } else {
                            out.push_str(&class.replace('\\', "\\\\"));
                        }
                        out.push(']');
                        i += offset + 1;
                    }
                    _ => out.push_str("\\["),
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Why a URL was accepted or turned away by the [`UrlFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Host is not on the allow-list
    DomainNotAllowed,
    /// An exclude pattern matched
    Excluded,
    /// Include patterns exist and none matched
    NotIncluded,
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Domain allow-list plus include/exclude path rules
///
/// A URL passes when its host is allowed, it matches at least one include
/// pattern (or there are none), and it matches no exclude pattern.
/// Exclusion always wins.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    allowed_domains: Vec<String>,
    include: Vec<CompiledPattern>,
    exclude: Vec<CompiledPattern>,
}

impl UrlFilter {
    pub fn new(
        allowed_domains: Vec<String>,
        include: &[PathPattern],
        exclude: &[PathPattern],
    ) -> ConfigResult<Self> {
        Ok(Self {
            allowed_domains,
            include: include
                .iter()
                .map(CompiledPattern::compile)
                .collect::<Result<_, _>>()?,
            exclude: exclude
                .iter()
                .map(CompiledPattern::compile)
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn from_site(site: &SiteConfig) -> ConfigResult<Self> {
        Self::new(site.allowed_domains.clone(), &site.include, &site.exclude)
    }

    /// Classifies a URL
    pub fn decide(&self, url: &Url) -> FilterDecision {
        let host_ok = url
            .host_str()
            .map_or(false, |host| domain_allowed(host, &self.allowed_domains));
        if !host_ok {
            return FilterDecision::DomainNotAllowed;
        }

        let path = url.path();

        if self.exclude.iter().any(|p| p.matches(path)) {
            return FilterDecision::Excluded;
        }

        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(path)) {
            return FilterDecision::NotIncluded;
        }

        FilterDecision::Accept
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.decide(url).is_accept()
    }
}
