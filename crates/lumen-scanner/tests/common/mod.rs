//! Fakes for the collaborators around the scanner core.

#![allow(dead_code)]

use async_trait::async_trait;
use lumen_core::{
    AppConfig, AxeNode, AxeResults, AxeRule, CombinedAxeResults, ReportFormat, ReportId,
    ReportRef, ScanGroupId, ScanId,
};
use lumen_db::{DatabaseError, MemoryStore, Versioned, VersionedStore, WriteCondition, WriteOutcome};
use lumen_scanner::{
    BrowserMetadata, CombinedResultAccumulator, CombinedResultsAccessor, ConsolidationCoordinator,
    CrawlEngine, CrawlRequest, DeepScanCoordinator, FeedQueue, PageScanOutcome, ReportMetadata,
    ReportRenderer, ReportStore, RetryPolicy, ScanFeedExpander, ScanFeedRequest,
    WebsiteScanAccessor, WebsiteScanRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "https://site.test/";

pub fn group() -> ScanGroupId {
    ScanGroupId::new("site-test").expect("valid id")
}

/// A deep-scan, consolidated-report page of the test site.
pub fn page(url: &str, violations: usize) -> PageScanOutcome {
    let violations = (0..violations)
        .map(|n| AxeRule {
            id: format!("rule-{n}"),
            impact: Some("serious".to_string()),
            nodes: vec![AxeNode {
                target: vec![format!("#node-{n}")],
                ..AxeNode::default()
            }],
            ..AxeRule::default()
        })
        .collect();

    PageScanOutcome {
        scan_id: ScanId::generate(),
        scanned_url: url.to_string(),
        axe_results: AxeResults {
            url: url.to_string(),
            violations,
            ..AxeResults::default()
        },
        discovered_links: Vec::new(),
        browser: BrowserMetadata {
            user_agent: "LumenTest/1.0".to_string(),
            browser_resolution: "1920x1080".to_string(),
        },
        browser_handle: None,
        website: Some(WebsiteScanRequest {
            group_id: Some(group()),
            base_url: BASE_URL.to_string(),
            deep_scan: true,
            consolidated_report: true,
            discovery_limit: None,
            discovery_patterns: Vec::new(),
            known_pages: Vec::new(),
            priority: None,
            notification_url: None,
        }),
    }
}

pub fn urls(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|path| format!("{BASE_URL}{path}")).collect()
}

/// Crawl engine returning a fixed list, or failing.
#[derive(Default)]
pub struct RecordingCrawler {
    pub found: Vec<String>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub patterns: Mutex<Vec<String>>,
}

impl RecordingCrawler {
    pub fn finding(found: Vec<String>) -> Self {
        Self {
            found,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrawlEngine for RecordingCrawler {
    async fn crawl(&self, request: CrawlRequest<'_>) -> anyhow::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.patterns.lock().expect("lock") = request.discovery_patterns.to_vec();
        if self.fail {
            anyhow::bail!("connection reset while crawling");
        }
        Ok(self.found.clone())
    }
}

/// Feed queue recording accepted batches.
#[derive(Default)]
pub struct RecordingQueue {
    pub batches: Mutex<Vec<Vec<ScanFeedRequest>>>,
    pub fail: bool,
}

impl RecordingQueue {
    pub fn requests(&self) -> Vec<ScanFeedRequest> {
        self.batches
            .lock()
            .expect("lock")
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FeedQueue for RecordingQueue {
    async fn enqueue(&self, batch: &[ScanFeedRequest]) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("queue unavailable");
        }
        self.batches.lock().expect("lock").push(batch.to_vec());
        Ok(())
    }
}

/// Renders a one-line summary of the combined results.
pub struct SummaryRenderer;

#[async_trait]
impl ReportRenderer for SummaryRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::ConsolidatedHtml
    }

    async fn render(
        &self,
        results: &CombinedAxeResults,
        metadata: &ReportMetadata<'_>,
    ) -> anyhow::Result<String> {
        Ok(format!(
            "{} {}: {} pages, {} failed",
            metadata.group_id, metadata.base_url, results.url_count.total, results.url_count.failed
        ))
    }
}

/// Report store keeping content in memory.
#[derive(Default)]
pub struct MemoryReports {
    pub saved: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ReportStore for MemoryReports {
    async fn save(
        &self,
        report_id: &ReportId,
        format: ReportFormat,
        content: &str,
    ) -> anyhow::Result<ReportRef> {
        self.saved
            .lock()
            .expect("lock")
            .insert(report_id.as_str().to_string(), content.to_string());
        Ok(ReportRef {
            report_id: report_id.clone(),
            format,
            href: format!("reports/{}.html", report_id.as_str()),
        })
    }
}

/// Store that cannot be reached.
pub struct UnreachableStore;

#[async_trait]
impl VersionedStore for UnreachableStore {
    async fn read(&self, _id: &str) -> lumen_db::Result<Option<Versioned>> {
        Err(DatabaseError::Query("connection refused".to_string()))
    }

    async fn write(
        &self,
        _id: &str,
        _content: &str,
        _condition: WriteCondition,
    ) -> lumen_db::Result<WriteOutcome> {
        Err(DatabaseError::Query("connection refused".to_string()))
    }
}

/// Store where another writer touches a document right before our
/// conditional updates, a given number of times.
pub struct InterferingStore {
    pub inner: Arc<MemoryStore>,
    pub remaining: AtomicUsize,
}

impl InterferingStore {
    pub fn new(inner: Arc<MemoryStore>, times: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl VersionedStore for InterferingStore {
    async fn read(&self, id: &str) -> lumen_db::Result<Option<Versioned>> {
        self.inner.read(id).await
    }

    async fn write(
        &self,
        id: &str,
        content: &str,
        condition: WriteCondition,
    ) -> lumen_db::Result<WriteOutcome> {
        if matches!(condition, WriteCondition::IfMatch(_))
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            if let Some(current) = self.inner.read(id).await? {
                self.inner
                    .write(id, &current.content, WriteCondition::IfMatch(current.token))
                    .await?;
            }
        }
        self.inner.write(id, content, condition).await
    }
}

/// Everything a test needs, wired over the given stores.
pub struct Harness {
    pub config: AppConfig,
    pub aggregates: WebsiteScanAccessor,
    pub blobs: CombinedResultsAccessor,
    pub crawler: Arc<RecordingCrawler>,
    pub queue: Arc<RecordingQueue>,
    pub reports: Arc<MemoryReports>,
}

impl Harness {
    pub fn new(
        documents: Arc<dyn VersionedStore>,
        blobs: Arc<dyn VersionedStore>,
        crawler: RecordingCrawler,
        queue: RecordingQueue,
    ) -> Self {
        let config = AppConfig::default();
        Self {
            aggregates: WebsiteScanAccessor::new(documents, config.retry.document_merge.into()),
            blobs: CombinedResultsAccessor::new(blobs),
            crawler: Arc::new(crawler),
            queue: Arc::new(queue),
            reports: Arc::new(MemoryReports::default()),
            config,
        }
    }

    pub fn in_memory(crawler: RecordingCrawler) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            crawler,
            RecordingQueue::default(),
        )
    }

    pub fn feed(&self) -> ScanFeedExpander {
        ScanFeedExpander::new(
            self.queue.clone(),
            self.aggregates.clone(),
            &self.config.feed,
            RetryPolicy::from(self.config.retry.feed_expansion),
        )
    }

    pub fn deep_scan(&self) -> DeepScanCoordinator {
        DeepScanCoordinator::new(
            self.crawler.clone(),
            self.aggregates.clone(),
            self.feed(),
            &self.config,
        )
    }

    pub fn consolidation(&self) -> ConsolidationCoordinator {
        ConsolidationCoordinator::new(
            self.aggregates.clone(),
            CombinedResultAccumulator::new(self.blobs.clone()),
            Arc::new(SummaryRenderer),
            self.reports.clone(),
            &self.config,
        )
    }
}
