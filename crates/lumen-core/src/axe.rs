//! Accessibility rule results, per page and combined per scan group.
//!
//! The per-page shapes mirror what the rule engine emits; this crate never
//! evaluates rules itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rule results for a single scanned page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxeResults {
    /// URL the rules ran against
    pub url: String,
    /// Rules that found violations
    #[serde(default)]
    pub violations: Vec<AxeRule>,
    /// Rules that passed
    #[serde(default)]
    pub passes: Vec<AxeRule>,
    /// Rules that need manual review
    #[serde(default)]
    pub incomplete: Vec<AxeRule>,
    /// Rules that did not apply
    #[serde(default)]
    pub inapplicable: Vec<AxeRule>,
}

impl AxeResults {
    /// Whether the page has at least one violation.
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// One rule's result on one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxeRule {
    /// Rule id, e.g. `color-contrast`
    pub id: String,
    /// Severity reported by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    /// Rule description
    #[serde(default)]
    pub description: String,
    /// Short help text
    #[serde(default)]
    pub help: String,
    /// Link to rule documentation
    #[serde(default)]
    pub help_url: String,
    /// Standards tags, e.g. `wcag2aa`
    #[serde(default)]
    pub tags: Vec<String>,
    /// Elements the rule matched
    #[serde(default)]
    pub nodes: Vec<AxeNode>,
}

/// One element matched by a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxeNode {
    /// CSS selector path to the element
    pub target: Vec<String>,
    /// Element markup snippet
    #[serde(default)]
    pub html: String,
    /// Engine-provided summary of the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,
}

/// Combined results accumulated across every merged page of a scan group.
///
/// Invariant: `url_count.total == url_count.passed + url_count.failed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedAxeResults {
    /// Page counters
    #[serde(default)]
    pub url_count: UrlCount,
    /// Rule-indexed findings
    #[serde(default)]
    pub axe_results: CombinedRuleSets,
    /// User agent of the first merged page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Browser resolution of the first merged page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_resolution: Option<String>,
}

/// Page counters for combined results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCount {
    /// Pages merged
    pub total: u64,
    /// Pages with no violations
    pub passed: u64,
    /// Pages with at least one violation
    pub failed: u64,
}

/// Aggregated rules, keyed by rule id, for each result category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedRuleSets {
    /// Rules with violations on at least one page
    #[serde(default)]
    pub violations: BTreeMap<String, AggregatedRule>,
    /// Rules that passed on at least one page
    #[serde(default)]
    pub passes: BTreeMap<String, AggregatedRule>,
    /// Rules needing review on at least one page
    #[serde(default)]
    pub incomplete: BTreeMap<String, AggregatedRule>,
    /// Rules inapplicable on at least one page
    #[serde(default)]
    pub inapplicable: BTreeMap<String, AggregatedRule>,
}

/// A rule's findings across all merged pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRule {
    /// Rule id
    pub id: String,
    /// Severity reported by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    /// Rule description
    #[serde(default)]
    pub description: String,
    /// Short help text
    #[serde(default)]
    pub help: String,
    /// Link to rule documentation
    #[serde(default)]
    pub help_url: String,
    /// Standards tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// One entry per page the rule reported on
    #[serde(default)]
    pub urls: Vec<RuleUrlEntry>,
}

/// A rule's findings on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleUrlEntry {
    /// Page URL
    pub url: String,
    /// Matched elements on that page
    #[serde(default)]
    pub nodes: Vec<AxeNode>,
}

impl AggregatedRule {
    /// Start an aggregate from a page-level rule, without any URL entries.
    #[must_use]
    pub fn from_rule(rule: &AxeRule) -> Self {
        Self {
            id: rule.id.clone(),
            impact: rule.impact.clone(),
            description: rule.description.clone(),
            help: rule.help.clone(),
            help_url: rule.help_url.clone(),
            tags: rule.tags.clone(),
            urls: Vec::new(),
        }
    }

    /// Total matched elements across all pages.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.urls.iter().map(|entry| entry.nodes.len()).sum()
    }
}
