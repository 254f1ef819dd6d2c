//! Inputs produced by, and interfaces of, the systems around the core.
//!
//! The page scanner hands over a [`PageScanOutcome`]. Crawling, queueing and
//! report rendering are behind traits; their implementations live outside
//! this crate.

use async_trait::async_trait;
use lumen_core::{
    AxeResults, BatchId, CombinedAxeResults, ReportFormat, ReportId, ReportRef, ScanGroupId,
    ScanId,
};
use serde::{Deserialize, Serialize};

/// Live browser the page was scanned in; the crawl engine reuses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserHandle {
    /// DevTools endpoint of the running browser
    pub endpoint: String,
    /// Target id of the scanned page
    pub page_id: String,
}

/// Browser and user agent details of a page scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserMetadata {
    /// User agent string the page saw
    pub user_agent: String,
    /// Viewport, e.g. `1920x1080`
    pub browser_resolution: String,
}

/// Site-level settings carried by a page scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteScanRequest {
    /// Scan group the page belongs to; required for any site-level work
    pub group_id: Option<ScanGroupId>,
    /// Root URL of the site
    pub base_url: String,
    /// Discover and queue further pages
    #[serde(default)]
    pub deep_scan: bool,
    /// Fold the page into the group's consolidated report
    #[serde(default)]
    pub consolidated_report: bool,
    /// Per-request override of the discovery limit
    #[serde(default)]
    pub discovery_limit: Option<usize>,
    /// Discovery patterns supplied by the requester
    #[serde(default)]
    pub discovery_patterns: Vec<String>,
    /// Pages the requester already knows about
    #[serde(default)]
    pub known_pages: Vec<String>,
    /// Priority for pages queued on this site's behalf
    #[serde(default)]
    pub priority: Option<i32>,
    /// Where to notify when queued scans finish
    #[serde(default)]
    pub notification_url: Option<String>,
}

/// A finished page scan.
#[derive(Debug, Clone)]
pub struct PageScanOutcome {
    /// Scan id of the page request
    pub scan_id: ScanId,
    /// URL that was scanned
    pub scanned_url: String,
    /// Rule results for the page
    pub axe_results: AxeResults,
    /// Outbound links found on the page
    pub discovered_links: Vec<String>,
    /// Browser details
    pub browser: BrowserMetadata,
    /// Browser still holding the page, if it is alive
    pub browser_handle: Option<BrowserHandle>,
    /// Site-level settings, absent for single-page scans
    pub website: Option<WebsiteScanRequest>,
}

/// One queued page scan produced by feed expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFeedRequest {
    /// Derived from `(batch_id, url)`
    pub scan_id: ScanId,
    /// Batch the request was submitted in
    pub batch_id: BatchId,
    /// Page to scan
    pub url: String,
    /// Queue priority
    pub priority: i32,
    /// Whether the queued page continues discovery
    pub deep_scan: bool,
    /// Completion notification target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    /// Scan group the request belongs to
    pub group_id: ScanGroupId,
}

/// Input to one crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlRequest<'a> {
    /// Root URL of the site
    pub base_url: &'a str,
    /// Patterns restricting which URLs are followed
    pub discovery_patterns: &'a [String],
    /// Links already found on the scanned page
    pub seed_links: &'a [String],
    /// Browser holding the scanned page
    pub browser: Option<&'a BrowserHandle>,
}

/// Discovers in-scope URLs reachable from a page.
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Crawl and return discovered URLs in discovery order.
    async fn crawl(&self, request: CrawlRequest<'_>) -> anyhow::Result<Vec<String>>;
}

/// Accepts batches of scan requests; delivery is at least once.
#[async_trait]
pub trait FeedQueue: Send + Sync {
    /// Submit one batch. An error means the batch may or may not be queued.
    async fn enqueue(&self, batch: &[ScanFeedRequest]) -> anyhow::Result<()>;
}

/// Details rendered into a consolidated report alongside the results.
#[derive(Debug, Clone)]
pub struct ReportMetadata<'a> {
    /// Scan group
    pub group_id: &'a ScanGroupId,
    /// Root URL of the site
    pub base_url: &'a str,
    /// Browser details of the triggering page
    pub browser: &'a BrowserMetadata,
}

/// Turns combined results into report content.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Format produced by this renderer.
    fn format(&self) -> ReportFormat;

    /// Render report content.
    async fn render(
        &self,
        results: &CombinedAxeResults,
        metadata: &ReportMetadata<'_>,
    ) -> anyhow::Result<String>;
}

/// Persists rendered reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Save (or overwrite) report content under `report_id`.
    async fn save(
        &self,
        report_id: &ReportId,
        format: ReportFormat,
        content: &str,
    ) -> anyhow::Result<ReportRef>;
}
