//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate, which applies
//! longest-match precedence. Crawl-delay and Sitemap lines are read here.

use chrono::{DateTime, Utc};
use robotstxt::DefaultMatcher;

/// Crawl-delay values above this (seconds) are clamped
const MAX_CRAWL_DELAY_SECS: f64 = 3600.0;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Policy {
    AllowAll,
    DisallowAll,
    Rules(String),
}

/// Parsed robots.txt data for one domain
#[derive(Debug, Clone)]
pub struct RobotsRules {
    policy: Policy,
    /// When the rules were obtained
    pub fetched_at: DateTime<Utc>,
}

impl RobotsRules {
    /// Creates rules from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// A RobotsRules instance that can be used to check URL permissions
    pub fn from_content(content: &str) -> Self {
        Self {
            policy: Policy::Rules(content.to_string()),
            fetched_at: Utc::now(),
        }
    }

    /// Permissive rules, used when a site has no robots.txt
    pub fn allow_all() -> Self {
        Self {
            policy: Policy::AllowAll,
            fetched_at: Utc::now(),
        }
    }

    /// Restrictive rules, used when robots.txt is unreachable and the crawl
    /// is configured to fail closed
    pub fn disallow_all() -> Self {
        Self {
            policy: Policy::DisallowAll,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if a URL is allowed for the given product token
    ///
    /// # Arguments
    ///
    /// * `url` - The URL (or path) to check
    /// * `user_agent` - The robots.txt product token, e.g. `docsweep`
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match &self.policy {
            Policy::AllowAll => true,
            Policy::DisallowAll => false,
            Policy::Rules(content) if content.trim().is_empty() => true,
            Policy::Rules(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group.
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds, at most one hour
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let Policy::Rules(content) = &self.policy else {
            return None;
        };

        let normalized_agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        // A User-agent line following any other directive starts a new group
        let mut group_has_rules = false;
        let mut delay_for_wildcard: Option<f64> = None;
        let mut delay_for_agent: Option<f64> = None;

        for (key, value) in directives(content) {
            match key.as_str() {
                "user-agent" => {
                    if group_has_rules {
                        group_agents.clear();
                        group_has_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }
                    let delay = delay.min(MAX_CRAWL_DELAY_SECS);
                    if group_agents
                        .iter()
                        .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
                    {
                        delay_for_agent = Some(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        delay_for_wildcard = Some(delay);
                    }
                }
                _ => group_has_rules = true,
            }
        }

        delay_for_agent.or(delay_for_wildcard)
    }

    /// Sitemap URLs listed in the file, in order of appearance
    pub fn sitemaps(&self) -> Vec<String> {
        let Policy::Rules(content) = &self.policy else {
            return Vec::new();
        };

        directives(content)
            .filter(|(key, _)| key == "sitemap")
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
            .collect()
    }
}

/// Iterates `key: value` lines with lowercase keys, skipping comments
fn directives(content: &str) -> impl Iterator<Item = (String, String)> + '_ {
    content.lines().filter_map(|line| {
        let line = line.split('#').next().unwrap_or("").trim();
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim().to_string()))
    })
}
