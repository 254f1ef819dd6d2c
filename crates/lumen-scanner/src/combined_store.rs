//! Typed access to combined results payloads.

use crate::error::{Result, ScanError};
use lumen_core::CombinedAxeResults;
use lumen_db::{VersionToken, VersionedStore, WriteCondition, WriteOutcome};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Combined results payload as read, plus what is needed to write it back.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedResultsSnapshot {
    /// Current payload; empty if nothing was stored yet
    pub results: CombinedAxeResults,
    /// Version read, `None` if the blob does not exist
    pub token: Option<VersionToken>,
    /// Blob id the payload lives (or will live) under
    pub blob_id: String,
}

/// Reads and conditionally writes [`CombinedAxeResults`] blobs.
#[derive(Clone)]
pub struct CombinedResultsAccessor {
    store: Arc<dyn VersionedStore>,
}

impl CombinedResultsAccessor {
    /// Create an accessor over a blob collection.
    #[must_use]
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Load the payload for `blob_id`, or start an empty one.
    ///
    /// Without a blob id a fresh id is minted and nothing is read.
    pub async fn get_or_create(&self, blob_id: Option<&str>) -> Result<CombinedResultsSnapshot> {
        let Some(blob_id) = blob_id else {
            let blob_id = Uuid::new_v4().to_string();
            debug!(blob_id = %blob_id, "Starting new combined results blob");
            return Ok(CombinedResultsSnapshot {
                results: CombinedAxeResults::default(),
                token: None,
                blob_id,
            });
        };

        let Some(stored) = self.store.read(blob_id).await? else {
            return Ok(CombinedResultsSnapshot {
                results: CombinedAxeResults::default(),
                token: None,
                blob_id: blob_id.to_string(),
            });
        };

        let results = serde_json::from_str(&stored.content).map_err(|e| {
            error!(
                alert = true,
                blob_id = %blob_id,
                error = %e,
                "Combined results blob is not parseable"
            );
            ScanError::corrupt(resource(blob_id), e)
        })?;

        Ok(CombinedResultsSnapshot {
            results,
            token: Some(stored.token),
            blob_id: blob_id.to_string(),
        })
    }

    /// Write `results` if the blob is still at `expected` (`None` = must not exist).
    pub async fn write(
        &self,
        blob_id: &str,
        results: &CombinedAxeResults,
        expected: Option<VersionToken>,
    ) -> Result<WriteOutcome> {
        let content =
            serde_json::to_string(results).map_err(|e| ScanError::corrupt(resource(blob_id), e))?;
        Ok(self
            .store
            .write(blob_id, &content, WriteCondition::expecting(expected))
            .await?)
    }
}

pub(crate) fn resource(blob_id: &str) -> String {
    format!("combined results {blob_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_db::MemoryStore;

    #[tokio::test]
    async fn test_without_blob_id_mints_one() {
        let store = Arc::new(MemoryStore::new());
        let accessor = CombinedResultsAccessor::new(store.clone());

        let first = accessor.get_or_create(None).await.expect("create");
        let second = accessor.get_or_create(None).await.expect("create");

        assert_ne!(first.blob_id, second.blob_id);
        assert!(first.token.is_none());
        assert_eq!(first.results, CombinedAxeResults::default());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_blob_reads_as_empty() {
        let accessor = CombinedResultsAccessor::new(Arc::new(MemoryStore::new()));
        let snapshot = accessor.get_or_create(Some("blob-1")).await.expect("read");
        assert_eq!(snapshot.blob_id, "blob-1");
        assert!(snapshot.token.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let accessor = CombinedResultsAccessor::new(Arc::new(MemoryStore::new()));
        let mut results = CombinedAxeResults::default();
        results.url_count.total = 1;
        results.url_count.passed = 1;

        let outcome = accessor.write("blob-1", &results, None).await.expect("write");
        assert!(matches!(outcome, WriteOutcome::Written(_)));

        let snapshot = accessor.get_or_create(Some("blob-1")).await.expect("read");
        assert_eq!(snapshot.results, results);
        assert!(snapshot.token.is_some());

        let stale = accessor.write("blob-1", &results, None).await.expect("write");
        assert_eq!(stale, WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_unparseable_blob_is_corrupt_state() {
        let store = Arc::new(MemoryStore::new());
        store
            .write("blob-1", "[]garbage", WriteCondition::IfAbsent)
            .await
            .expect("seed");

        let result = CombinedResultsAccessor::new(store).get_or_create(Some("blob-1")).await;
        assert!(matches!(result, Err(ScanError::CorruptState { .. })));
    }
}
