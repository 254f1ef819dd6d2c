//! Typed access to the per-group website scan aggregate.
//!
//! Two write paths exist. [`WebsiteScanAccessor::merge_or_create`] re-reads
//! and re-applies its patch until the conditional write lands, which is safe
//! for patches that only add information. [`WebsiteScanAccessor::update_if_unchanged`]
//! refuses to write unless the document is still at the version the caller
//! read earlier, for callers whose patch was computed from that snapshot.

use crate::error::{Result, ScanError};
use crate::retry::{RetryOrchestrator, RetryPolicy};
use crate::urls::dedupe_urls;
use lumen_core::{ScanGroupId, WebsiteScanAggregate, WebsiteScanPatch};
use lumen_db::{VersionToken, VersionedStore, WriteCondition, WriteOutcome};
use std::sync::Arc;
use tracing::{debug, error};

/// Reads and writes [`WebsiteScanAggregate`] documents.
#[derive(Clone)]
pub struct WebsiteScanAccessor {
    store: Arc<dyn VersionedStore>,
    merge_retry: RetryOrchestrator,
}

impl WebsiteScanAccessor {
    /// Create an accessor; `merge_policy` bounds the internal conflict loop
    /// of [`merge_or_create`](Self::merge_or_create).
    #[must_use]
    pub fn new(store: Arc<dyn VersionedStore>, merge_policy: RetryPolicy) -> Self {
        Self {
            store,
            merge_retry: RetryOrchestrator::new("website_scan_merge", merge_policy),
        }
    }

    /// Read the aggregate and the version it was read at.
    pub async fn read(
        &self,
        group_id: &ScanGroupId,
    ) -> Result<Option<(WebsiteScanAggregate, VersionToken)>> {
        let Some(stored) = self.store.read(group_id.as_str()).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<WebsiteScanAggregate>(&stored.content) {
            Ok(aggregate) => Ok(Some((aggregate, stored.token))),
            Err(e) => {
                error!(
                    alert = true,
                    group_id = %group_id,
                    error = %e,
                    "Website scan document is not parseable"
                );
                Err(ScanError::corrupt(resource(group_id), e))
            }
        }
    }

    /// Apply `patch`, creating the aggregate from it if none exists.
    ///
    /// Lost races are retried against a fresh read within the merge policy.
    pub async fn merge_or_create(
        &self,
        group_id: &ScanGroupId,
        patch: &WebsiteScanPatch,
    ) -> Result<WebsiteScanAggregate> {
        self.merge_retry
            .run(|attempt| async move {
                let current = self.read(group_id).await?;
                if patch.is_empty() {
                    if let Some((aggregate, _)) = current {
                        return Ok(aggregate);
                    }
                }
                let token = current.as_ref().map(|(_, token)| *token);
                if attempt > 1 {
                    debug!(group_id = %group_id, attempt, "Re-applying website scan patch");
                }
                self.write_patched(group_id, current, token, patch).await
            })
            .await
    }

    /// Apply `patch` only if the aggregate is still at `expected`.
    ///
    /// `expected == None` means the caller saw no aggregate; the write then
    /// creates it. Any mismatch is reported as
    /// [`ScanError::ConcurrentModification`] without writing.
    pub async fn update_if_unchanged(
        &self,
        group_id: &ScanGroupId,
        patch: &WebsiteScanPatch,
        expected: Option<VersionToken>,
    ) -> Result<WebsiteScanAggregate> {
        let current = self.read(group_id).await?;
        let token = current.as_ref().map(|(_, token)| *token);
        if token != expected {
            debug!(
                group_id = %group_id,
                expected = ?expected,
                found = ?token,
                "Website scan changed since it was read"
            );
            return Err(ScanError::conflict(resource(group_id)));
        }

        self.write_patched(group_id, current, token, patch).await
    }

    async fn write_patched(
        &self,
        group_id: &ScanGroupId,
        current: Option<(WebsiteScanAggregate, VersionToken)>,
        token: Option<VersionToken>,
        patch: &WebsiteScanPatch,
    ) -> Result<WebsiteScanAggregate> {
        let aggregate = match current {
            Some((mut aggregate, _)) => {
                apply_patch(&mut aggregate, patch);
                aggregate
            }
            None => create_from_patch(group_id, patch),
        };

        let content = serde_json::to_string(&aggregate)
            .map_err(|e| ScanError::corrupt(resource(group_id), e))?;

        match self
            .store
            .write(
                group_id.as_str(),
                &content,
                WriteCondition::expecting(token),
            )
            .await?
        {
            WriteOutcome::Written(_) => Ok(aggregate),
            WriteOutcome::Conflict => Err(ScanError::conflict(resource(group_id))),
        }
    }
}

fn resource(group_id: &ScanGroupId) -> String {
    format!("website scan {group_id}")
}

/// Build a new aggregate from a patch.
#[must_use]
pub fn create_from_patch(group_id: &ScanGroupId, patch: &WebsiteScanPatch) -> WebsiteScanAggregate {
    let mut aggregate = WebsiteScanAggregate::new(
        group_id.clone(),
        patch.base_url.clone().unwrap_or_default(),
    );
    apply_patch(&mut aggregate, patch);
    aggregate
}

/// Merge a sparse patch into an aggregate.
///
/// Scalars and discovery patterns are replaced. Known pages are unioned
/// (see [`dedupe_urls`] for ordering). Page scans are upserted by scan id and
/// reports by report id. Every page scan URL ends up in `known_pages`.
pub fn apply_patch(aggregate: &mut WebsiteScanAggregate, patch: &WebsiteScanPatch) {
    if let Some(base_url) = &patch.base_url {
        aggregate.base_url.clone_from(base_url);
    }

    if let Some(known_pages) = &patch.known_pages {
        aggregate.known_pages = dedupe_urls(&aggregate.known_pages, known_pages);
    }

    if let Some(patterns) = &patch.discovery_patterns {
        aggregate.discovery_patterns.clone_from(patterns);
    }

    if let Some(page_scans) = &patch.page_scans {
        for scan in page_scans {
            match aggregate
                .page_scans
                .iter_mut()
                .find(|existing| existing.scan_id == scan.scan_id)
            {
                Some(existing) => *existing = scan.clone(),
                None => aggregate.page_scans.push(scan.clone()),
            }
        }

        let unknown: Vec<String> = aggregate
            .page_scans
            .iter()
            .filter(|scan| !aggregate.known_pages.contains(&scan.url))
            .map(|scan| scan.url.clone())
            .collect();
        if !unknown.is_empty() {
            aggregate.known_pages = dedupe_urls(&aggregate.known_pages, &unknown);
        }
    }

    if let Some(blob_id) = &patch.combined_results_blob_id {
        aggregate.combined_results_blob_id = Some(blob_id.clone());
    }

    if let Some(reports) = &patch.reports {
        for report in reports {
            match aggregate
                .reports
                .iter_mut()
                .find(|existing| existing.report_id == report.report_id)
            {
                Some(existing) => *existing = report.clone(),
                None => aggregate.reports.push(report.clone()),
            }
        }
    }
}
