//! Consolidated report generation for one finished page.
//!
//! Sequence per attempt: read the aggregate, merge the page into the group's
//! combined results, render and save the consolidated report, then write the
//! blob id and report reference back to the aggregate, conditional on the
//! version read at the start. Losing that last race re-runs the sequence.

use crate::accumulator::{CombinedResultAccumulator, MergedResults};
use crate::aggregate_store::WebsiteScanAccessor;
use crate::collaborators::{PageScanOutcome, ReportMetadata, ReportRenderer, ReportStore};
use crate::context::ScanContext;
use crate::deep_scan::scan_group;
use crate::error::{Result, ScanError};
use crate::retry::RetryOrchestrator;
use lumen_core::{AppConfig, ReportId, ReportRef, ScanGroupId, WebsiteScanPatch};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn, Instrument};

/// Keeps a group's consolidated report current.
pub struct ConsolidationCoordinator {
    aggregates: WebsiteScanAccessor,
    accumulator: CombinedResultAccumulator,
    renderer: Arc<dyn ReportRenderer>,
    reports: Arc<dyn ReportStore>,
    retry: RetryOrchestrator,
    merge_retry: RetryOrchestrator,
}

impl ConsolidationCoordinator {
    /// Create a coordinator using retry budgets from `config`.
    #[must_use]
    pub fn new(
        aggregates: WebsiteScanAccessor,
        accumulator: CombinedResultAccumulator,
        renderer: Arc<dyn ReportRenderer>,
        reports: Arc<dyn ReportStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            aggregates,
            accumulator,
            renderer,
            reports,
            retry: RetryOrchestrator::new("consolidation", config.retry.consolidation.into()),
            merge_retry: RetryOrchestrator::new(
                "combined_results_merge",
                config.retry.combined_results.into(),
            ),
        }
    }

    /// Fold `outcome` into its group's consolidated report.
    ///
    /// Returns the report reference to attach to the page result. After the
    /// retry budget is spent the error is [`ScanError::ConsolidationFailed`].
    pub async fn consolidate(&self, ctx: &ScanContext, outcome: &PageScanOutcome) -> Result<ReportRef> {
        let (_, group_id) = scan_group(outcome)?;

        // Merged payload of this page, kept so a retry never merges it twice.
        let merged: Mutex<Option<MergedResults>> = Mutex::new(None);

        self.retry
            .execute(
                |attempt| {
                    debug!(attempt, "Consolidation attempt");
                    self.consolidate_once(group_id, outcome, &merged)
                },
                |e, attempt| {
                    warn!(group_id = %group_id, attempt, error = %e, "Consolidation attempt failed");
                },
            )
            .instrument(ctx.span().clone())
            .await
            .map_err(|e| {
                error!(
                    parent: ctx.span(),
                    group_id = %group_id,
                    alert = e.requires_alert(),
                    error = %e,
                    "Consolidation failed"
                );
                ScanError::ConsolidationFailed {
                    group_id: group_id.clone(),
                    source: Box::new(e),
                }
            })
    }

    async fn consolidate_once(
        &self,
        group_id: &ScanGroupId,
        outcome: &PageScanOutcome,
        merged: &Mutex<Option<MergedResults>>,
    ) -> Result<ReportRef> {
        let current = self.aggregates.read(group_id).await?;
        let token = current.as_ref().map(|(_, token)| *token);
        let aggregate = current.map(|(aggregate, _)| aggregate);
        let blob_id = aggregate
            .as_ref()
            .and_then(|aggregate| aggregate.combined_results_blob_id.clone());

        let results = self.merge_page(outcome, blob_id.as_deref(), merged).await?;

        let format = self.renderer.format();
        let report_id = aggregate
            .as_ref()
            .and_then(|aggregate| aggregate.report(format))
            .map_or_else(ReportId::generate, |report| report.report_id.clone());

        let base_url = match &aggregate {
            Some(aggregate) => aggregate.base_url.as_str(),
            None => outcome
                .website
                .as_ref()
                .map_or(outcome.scanned_url.as_str(), |website| website.base_url.as_str()),
        };
        let metadata = ReportMetadata {
            group_id,
            base_url,
            browser: &outcome.browser,
        };

        let content = self
            .renderer
            .render(&results.results, &metadata)
            .await
            .map_err(|e| ScanError::Report(format!("{e:#}")))?;
        let report = self
            .reports
            .save(&report_id, format, &content)
            .await
            .map_err(|e| ScanError::Report(format!("{e:#}")))?;

        let patch = WebsiteScanPatch {
            base_url: aggregate.is_none().then(|| base_url.to_string()),
            combined_results_blob_id: Some(results.blob_id.clone()),
            reports: Some(vec![report.clone()]),
            ..WebsiteScanPatch::default()
        };
        self.aggregates
            .update_if_unchanged(group_id, &patch, token)
            .await?;

        info!(
            group_id = %group_id,
            report_id = %report.report_id,
            pages = results.results.url_count.total,
            "Consolidated report updated"
        );
        Ok(report)
    }

    /// Merge the page once per invocation.
    ///
    /// A cached merge is reused while the aggregate points at no blob yet or
    /// still at the cached blob, which is then re-read. If another page
    /// registered a different blob in the meantime, the page is merged into
    /// that one instead.
    async fn merge_page(
        &self,
        outcome: &PageScanOutcome,
        blob_id: Option<&str>,
        merged: &Mutex<Option<MergedResults>>,
    ) -> Result<MergedResults> {
        let cached = merged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(cached) = cached {
            match blob_id {
                None => {
                    debug!(blob_id = %cached.blob_id, "Reusing merged combined results");
                    return Ok(cached);
                }
                Some(blob_id) if blob_id == cached.blob_id => {
                    // Other pages may have merged since; render what is stored now.
                    return self.accumulator.current(blob_id).await;
                }
                Some(_) => {}
            }
            debug!(
                abandoned = %cached.blob_id,
                "Combined results blob changed, merging again"
            );
        }

        let results = self
            .merge_retry
            .run(|_| self.accumulator.merge_one(outcome, blob_id))
            .await?;
        *merged.lock().unwrap_or_else(PoisonError::into_inner) = Some(results.clone());
        Ok(results)
    }
}
