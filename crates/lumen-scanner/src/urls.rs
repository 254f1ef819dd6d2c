//! URL set arithmetic for deep scans.
//!
//! [`process_discovered_urls`] trims a crawl's output to what may still be
//! added under the discovery limit; [`dedupe_urls`] merges two URL lists with
//! a fixed ordering policy; [`ScopeFilter`] applies discovery patterns.

use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Newly discovered URLs that may still be added to a site's known pages.
///
/// Returns the elements of `discovered` that are not in `known`, in their
/// original order and without repeats, truncated to
/// `max(crawl_limit - |known|, 0)`. Without `known` only the truncation applies.
#[must_use]
pub fn process_discovered_urls(
    discovered: &[String],
    crawl_limit: usize,
    known: Option<&[String]>,
) -> Vec<String> {
    if discovered.is_empty() {
        return Vec::new();
    }

    let known_set: HashSet<&str> = known
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .collect();
    let budget = crawl_limit.saturating_sub(known.map_or(0, <[String]>::len));

    let mut seen = HashSet::new();
    discovered
        .iter()
        .filter(|url| !known_set.contains(url.as_str()))
        .filter(|url| seen.insert(url.as_str()))
        .take(budget)
        .cloned()
        .collect()
}

/// Deduplicated union of `known` and `discovered`.
///
/// Ordering policy: newly discovered URLs come first, in their discovery
/// order, followed by the known URLs that were not rediscovered, in their
/// stored order. The first occurrence of a URL wins.
#[must_use]
pub fn dedupe_urls(known: &[String], discovered: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(known.len() + discovered.len());
    discovered
        .iter()
        .chain(known)
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

/// Discovery pattern covering everything under `base_url`.
///
/// `https://example.com/docs/intro.html` yields
/// `^http(s?)://example\.com/docs/(.*)`: either scheme, same host (and port),
/// anything below the base URL's directory.
pub fn discovery_pattern_for(base_url: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(base_url)?;
    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let path = url.path();
    let directory = match path.rfind('/') {
        Some(index) => &path[..=index],
        None => "/",
    };

    Ok(format!(
        "^http(s?)://{}{}(.*)",
        regex::escape(&authority),
        regex::escape(directory)
    ))
}

/// Compiled discovery patterns.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    patterns: Vec<Regex>,
}

impl ScopeFilter {
    /// Compile patterns; invalid ones are logged and skipped.
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Ignoring invalid discovery pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Whether `url` matches any pattern. No patterns means no restriction.
    #[must_use]
    pub fn is_in_scope(&self, url: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(url))
    }
}
