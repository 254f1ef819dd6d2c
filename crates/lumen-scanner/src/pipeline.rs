//! Site-level work that follows a finished page scan.
//!
//! Nothing in here can fail the page itself: every stage's error is logged
//! and recorded in the returned [`PostScanSummary`].

use crate::aggregate_store::WebsiteScanAccessor;
use crate::collaborators::PageScanOutcome;
use crate::consolidation::ConsolidationCoordinator;
use crate::context::ScanContext;
use crate::deep_scan::{scan_group, DeepScanCoordinator, DeepScanOutcome};
use crate::error::{Result, ScanError};
use crate::retry::RetryOrchestrator;
use lumen_core::{
    AppConfig, PageScan, ReportRef, RunState, ScanGroupId, Timestamp, WebsiteScanPatch,
};
use tracing::{error, info, Instrument};

/// Result of one post-scan stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StageStatus {
    /// Not requested for this page
    #[default]
    Skipped,
    /// Completed
    Succeeded,
    /// Failed; the page scan itself is unaffected
    Failed {
        /// Error message
        error: String,
        /// Whether the failure needs operator attention
        alert: bool,
    },
}

impl StageStatus {
    fn failed(error: &ScanError) -> Self {
        Self::Failed {
            error: error.to_string(),
            alert: error.requires_alert(),
        }
    }

    /// Whether the stage failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// What the pipeline did for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostScanSummary {
    /// Recording the page's run state on the aggregate
    pub run_state: StageStatus,
    /// Consolidated report update
    pub consolidation: StageStatus,
    /// Discovery and feed expansion
    pub deep_scan: StageStatus,
    /// Report references to attach to the page result
    pub reports: Vec<ReportRef>,
    /// Discovery details, when the deep scan ran
    pub discovery: Option<DeepScanOutcome>,
}

impl PostScanSummary {
    /// Whether no stage failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.run_state.is_failed() && !self.consolidation.is_failed() && !self.deep_scan.is_failed()
    }
}

/// Runs the site-level stages for finished pages.
pub struct PostScanPipeline {
    aggregates: WebsiteScanAccessor,
    consolidation: Option<ConsolidationCoordinator>,
    deep_scan: Option<DeepScanCoordinator>,
    update_retry: RetryOrchestrator,
}

impl PostScanPipeline {
    /// Create a pipeline that only records run states.
    #[must_use]
    pub fn new(aggregates: WebsiteScanAccessor, config: &AppConfig) -> Self {
        Self {
            aggregates,
            consolidation: None,
            deep_scan: None,
            update_retry: RetryOrchestrator::new(
                "run_state_update",
                config.retry.aggregate_update.into(),
            ),
        }
    }

    /// Enable consolidated reports.
    #[must_use]
    pub fn with_consolidation(mut self, coordinator: ConsolidationCoordinator) -> Self {
        self.consolidation = Some(coordinator);
        self
    }

    /// Enable deep scans.
    #[must_use]
    pub fn with_deep_scan(mut self, coordinator: DeepScanCoordinator) -> Self {
        self.deep_scan = Some(coordinator);
        self
    }

    /// Run every requested stage for a successfully scanned page.
    ///
    /// Consolidation runs before discovery so the report reflects this page
    /// even when discovery fails.
    pub async fn process(&self, ctx: &ScanContext, outcome: &PageScanOutcome) -> PostScanSummary {
        self.process_inner(ctx, outcome)
            .instrument(ctx.span().clone())
            .await
    }

    async fn process_inner(&self, ctx: &ScanContext, outcome: &PageScanOutcome) -> PostScanSummary {
        let mut summary = PostScanSummary::default();
        let Some(website) = &outcome.website else {
            return summary;
        };

        summary.run_state = match scan_group(outcome) {
            Ok((_, group_id)) => {
                let page = PageScan {
                    scan_id: outcome.scan_id,
                    url: outcome.scanned_url.clone(),
                    timestamp: Timestamp::now(),
                    run_state: RunState::Completed,
                };
                Self::stage_status("run_state", self.record(group_id, &website.base_url, page).await)
            }
            Err(e) => Self::stage_status::<()>("run_state", Err(e)),
        };

        if website.consolidated_report {
            if let Some(coordinator) = &self.consolidation {
                let result = coordinator.consolidate(ctx, outcome).await;
                if let Ok(report) = &result {
                    summary.reports.push(report.clone());
                }
                summary.consolidation = Self::stage_status("consolidation", result);
            }
        }

        if website.deep_scan {
            if let Some(coordinator) = &self.deep_scan {
                let result = coordinator.run(ctx, outcome).await;
                if let Ok(discovery) = &result {
                    summary.discovery = Some(discovery.clone());
                }
                summary.deep_scan = Self::stage_status("deep_scan", result);
            }
        }

        info!(
            clean = summary.is_clean(),
            reports = summary.reports.len(),
            "Post-scan processing finished"
        );
        summary
    }

    /// Mark a page whose scan failed as failed on its group's aggregate.
    ///
    /// Does nothing for pages without a scan group.
    pub async fn record_failure(&self, ctx: &ScanContext, base_url: &str) -> StageStatus {
        let Some(group_id) = ctx.group_id() else {
            return StageStatus::Skipped;
        };
        let page = PageScan {
            scan_id: ctx.scan_id(),
            url: ctx.url().to_string(),
            timestamp: Timestamp::now(),
            run_state: RunState::Failed,
        };

        let result = self
            .record(group_id, base_url, page)
            .instrument(ctx.span().clone())
            .await;
        let _entered = ctx.span().enter();
        Self::stage_status("run_state", result)
    }

    async fn record(&self, group_id: &ScanGroupId, base_url: &str, page: PageScan) -> Result<()> {
        let patch = &WebsiteScanPatch {
            page_scans: Some(vec![page]),
            ..WebsiteScanPatch::default()
        };

        self.update_retry
            .run(|_| async move {
                if self.aggregates.read(group_id).await?.is_none() {
                    let create = WebsiteScanPatch {
                        base_url: Some(base_url.to_string()),
                        ..patch.clone()
                    };
                    return self.aggregates.merge_or_create(group_id, &create).await;
                }
                self.aggregates.merge_or_create(group_id, patch).await
            })
            .await
            .map(|_| ())
    }

    fn stage_status<T>(stage: &'static str, result: Result<T>) -> StageStatus {
        match result {
            Ok(_) => StageStatus::Succeeded,
            Err(e) => {
                error!(stage, alert = e.requires_alert(), error = %e, "Post-scan stage failed");
                StageStatus::failed(&e)
            }
        }
    }
}
