//! Folding one page's rule results into a scan group's combined results.

use crate::collaborators::PageScanOutcome;
use crate::combined_store::{resource, CombinedResultsAccessor};
use crate::error::{Result, ScanError};
use lumen_core::{AggregatedRule, AxeRule, CombinedAxeResults, RuleUrlEntry};
use lumen_db::WriteOutcome;
use std::collections::BTreeMap;
use tracing::debug;

/// Combined results after a successful merge, with the blob they were written to.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResults {
    /// Payload as written
    pub results: CombinedAxeResults,
    /// Blob id the payload was written under
    pub blob_id: String,
}

/// Merges page outcomes into combined results blobs.
///
/// A page must be merged at most once; this type does not detect repeats.
#[derive(Clone)]
pub struct CombinedResultAccumulator {
    blobs: CombinedResultsAccessor,
}

impl CombinedResultAccumulator {
    /// Create an accumulator writing through `blobs`.
    #[must_use]
    pub fn new(blobs: CombinedResultsAccessor) -> Self {
        Self { blobs }
    }

    /// Merge `outcome` into the blob `blob_id` (a new blob if `None`).
    ///
    /// A lost race is [`ScanError::ConcurrentModification`]; retrying the
    /// call re-reads the blob.
    pub async fn merge_one(
        &self,
        outcome: &PageScanOutcome,
        blob_id: Option<&str>,
    ) -> Result<MergedResults> {
        let mut snapshot = self.blobs.get_or_create(blob_id).await?;

        fold_page(&mut snapshot.results, outcome);

        match self
            .blobs
            .write(&snapshot.blob_id, &snapshot.results, snapshot.token)
            .await?
        {
            WriteOutcome::Written(token) => {
                debug!(
                    blob_id = %snapshot.blob_id,
                    version = %token,
                    total = snapshot.results.url_count.total,
                    "Merged page into combined results"
                );
                Ok(MergedResults {
                    results: snapshot.results,
                    blob_id: snapshot.blob_id,
                })
            }
            WriteOutcome::Conflict => Err(ScanError::conflict(resource(&snapshot.blob_id))),
        }
    }

    /// Current payload of an existing blob, without merging anything.
    pub async fn current(&self, blob_id: &str) -> Result<MergedResults> {
        let snapshot = self.blobs.get_or_create(Some(blob_id)).await?;
        Ok(MergedResults {
            results: snapshot.results,
            blob_id: snapshot.blob_id,
        })
    }
}

/// Fold one page into `combined` in memory.
pub fn fold_page(combined: &mut CombinedAxeResults, outcome: &PageScanOutcome) {
    let page = &outcome.axe_results;
    let url = outcome.scanned_url.as_str();

    combined.url_count.total += 1;
    if page.has_violations() {
        combined.url_count.failed += 1;
    } else {
        combined.url_count.passed += 1;
    }

    let rule_sets = &mut combined.axe_results;
    fold_rules(&mut rule_sets.violations, &page.violations, url);
    fold_rules(&mut rule_sets.passes, &page.passes, url);
    fold_rules(&mut rule_sets.incomplete, &page.incomplete, url);
    fold_rules(&mut rule_sets.inapplicable, &page.inapplicable, url);

    if combined.user_agent.is_none() && !outcome.browser.user_agent.is_empty() {
        combined.user_agent = Some(outcome.browser.user_agent.clone());
    }
    if combined.browser_resolution.is_none() && !outcome.browser.browser_resolution.is_empty() {
        combined.browser_resolution = Some(outcome.browser.browser_resolution.clone());
    }
}

fn fold_rules(target: &mut BTreeMap<String, AggregatedRule>, rules: &[AxeRule], url: &str) {
    for rule in rules {
        let aggregated = target
            .entry(rule.id.clone())
            .or_insert_with(|| AggregatedRule::from_rule(rule));

        match aggregated.urls.iter_mut().find(|entry| entry.url == url) {
            Some(entry) => {
                for node in &rule.nodes {
                    if !entry.nodes.contains(node) {
                        entry.nodes.push(node.clone());
                    }
                }
            }
            None => aggregated.urls.push(RuleUrlEntry {
                url: url.to_string(),
                nodes: rule.nodes.clone(),
            }),
        }
    }
}
