//! The website scan aggregate: one shared document per scan group.
//!
//! Many page-scan processes of the same group read and write this document
//! concurrently. It is always persisted through a versioned store; this
//! module only defines its shape.

use crate::types::{ReportId, ScanGroupId, ScanId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Site-wide state for one scan group.
///
/// Invariant: every `page_scans[i].url` is also in `known_pages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteScanAggregate {
    /// Scan group this aggregate belongs to
    pub id: ScanGroupId,
    /// Root URL of the scanned site
    pub base_url: String,
    /// Every in-scope URL known for the site, first-seen order
    #[serde(default)]
    pub known_pages: Vec<String>,
    /// Patterns defining which URLs are in scope for discovery
    #[serde(default)]
    pub discovery_patterns: Vec<String>,
    /// Page scans registered for the group, in registration order
    #[serde(default)]
    pub page_scans: Vec<PageScan>,
    /// Blob holding the group's combined results, once one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_results_blob_id: Option<String>,
    /// Reports produced for the group
    #[serde(default)]
    pub reports: Vec<ReportRef>,
}

impl WebsiteScanAggregate {
    /// Create an empty aggregate for a group.
    #[must_use]
    pub fn new(id: ScanGroupId, base_url: impl Into<String>) -> Self {
        Self {
            id,
            base_url: base_url.into(),
            known_pages: Vec::new(),
            discovery_patterns: Vec::new(),
            page_scans: Vec::new(),
            combined_results_blob_id: None,
            reports: Vec::new(),
        }
    }

    /// Find the report of a given format, if one was already produced.
    #[must_use]
    pub fn report(&self, format: ReportFormat) -> Option<&ReportRef> {
        self.reports.iter().find(|r| r.format == format)
    }

    /// Whether a page scan is already registered for `url`.
    #[must_use]
    pub fn has_page_scan(&self, url: &str) -> bool {
        self.page_scans.iter().any(|scan| scan.url == url)
    }
}

/// One page scan registered against the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageScan {
    /// Scan id of the page request
    pub scan_id: ScanId,
    /// Page URL
    pub url: String,
    /// When this entry was last written
    pub timestamp: Timestamp,
    /// Lifecycle state of the page scan
    #[serde(default)]
    pub run_state: RunState,
}

impl PageScan {
    /// Entry for a request that was just queued.
    #[must_use]
    pub fn queued(scan_id: ScanId, url: impl Into<String>) -> Self {
        Self {
            scan_id,
            url: url.into(),
            timestamp: Timestamp::now(),
            run_state: RunState::Queued,
        }
    }
}

/// Lifecycle state of a page scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Accepted by the feed queue
    #[default]
    Queued,
    /// Picked up by a scanner
    Running,
    /// Scan finished
    Completed,
    /// Scan failed
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Format of a stored report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Per-page HTML report
    Html,
    /// Per-page SARIF report
    Sarif,
    /// Site-wide consolidated HTML report
    ConsolidatedHtml,
}

/// Reference to a persisted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRef {
    /// Report id, stable across regenerations of the same artifact
    pub report_id: ReportId,
    /// Report format
    pub format: ReportFormat,
    /// Storage location returned by the report store
    pub href: String,
}

/// Sparse update for a [`WebsiteScanAggregate`].
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebsiteScanPatch {
    /// Base URL (used when creating the aggregate)
    pub base_url: Option<String>,
    /// URLs to add to the known page set
    pub known_pages: Option<Vec<String>>,
    /// Discovery patterns to store
    pub discovery_patterns: Option<Vec<String>>,
    /// Page scans to insert or update (keyed by scan id)
    pub page_scans: Option<Vec<PageScan>>,
    /// Combined results blob pointer
    pub combined_results_blob_id: Option<String>,
    /// Reports to insert or replace (keyed by report id)
    pub reports: Option<Vec<ReportRef>>,
}

impl WebsiteScanPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
