//! Turning a site's known pages into queued page scan requests.
//!
//! The set of pages to queue is always recomputed from the aggregate as
//! `known_pages - page_scans`, so a page registered by an earlier run is never
//! queued again. Pages are only registered after every batch was accepted.

use crate::aggregate_store::WebsiteScanAccessor;
use crate::collaborators::{FeedQueue, ScanFeedRequest};
use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::retry::{RetryOrchestrator, RetryPolicy};
use futures::stream::{FuturesUnordered, StreamExt};
use lumen_core::{
    BatchId, FeedConfig, PageScan, ScanGroupId, ScanId, WebsiteScanAggregate, WebsiteScanPatch,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Per-request settings applied to every queued page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOptions {
    /// Queue priority
    pub priority: i32,
    /// Whether queued pages continue discovery
    pub deep_scan: bool,
    /// Completion notification target
    pub notification_url: Option<String>,
}

/// What one expansion queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedExpansion {
    /// Requests accepted by the queue
    pub queued: usize,
    /// Batches submitted
    pub batches: usize,
}

/// Queues scan requests for pages a scan group knows but has not scanned.
pub struct ScanFeedExpander {
    queue: Arc<dyn FeedQueue>,
    aggregates: WebsiteScanAccessor,
    batch_size: usize,
    max_concurrent_batches: usize,
    retry: RetryOrchestrator,
}

impl ScanFeedExpander {
    /// Create an expander with batching taken from `config`.
    #[must_use]
    pub fn new(
        queue: Arc<dyn FeedQueue>,
        aggregates: WebsiteScanAccessor,
        config: &FeedConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            aggregates,
            batch_size: config.batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
            retry: RetryOrchestrator::new("feed_expansion", retry),
        }
    }

    /// Set the number of requests per batch.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the number of batches submitted at once.
    #[must_use]
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max.max(1);
        self
    }

    /// Queue every pending page of `group_id`, retrying the whole expansion.
    ///
    /// Each attempt re-reads the aggregate and mints new batch ids. Exhaustion
    /// is returned as [`ScanError::ExpansionFailed`].
    pub async fn expand(
        &self,
        ctx: &ScanContext,
        group_id: &ScanGroupId,
        options: &FeedOptions,
    ) -> Result<FeedExpansion> {
        self.retry
            .execute(
                |_| self.expand_once(group_id, options),
                |e, attempt| {
                    warn!(group_id = %group_id, attempt, error = %e, "Feed expansion attempt failed");
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
                    "Feed expansion failed"
                );
                ScanError::ExpansionFailed {
                    group_id: group_id.clone(),
                    source: Box::new(e),
                }
            })
    }

    async fn expand_once(
        &self,
        group_id: &ScanGroupId,
        options: &FeedOptions,
    ) -> Result<FeedExpansion> {
        let Some((aggregate, _)) = self.aggregates.read(group_id).await? else {
            debug!(group_id = %group_id, "No website scan to expand");
            return Ok(FeedExpansion::default());
        };

        let pending = pending_urls(&aggregate);
        if pending.is_empty() {
            debug!(group_id = %group_id, "No unscanned pages to queue");
            return Ok(FeedExpansion::default());
        }

        let batches: Vec<Vec<ScanFeedRequest>> = pending
            .chunks(self.batch_size)
            .map(|chunk| build_batch(BatchId::generate(), chunk, group_id, options))
            .collect();

        let mut in_flight = FuturesUnordered::new();
        for batch in &batches {
            in_flight.push(self.submit(batch));

            // Respect concurrency limit
            while in_flight.len() >= self.max_concurrent_batches {
                if let Some(result) = in_flight.next().await {
                    result?;
                }
            }
        }
        while let Some(result) = in_flight.next().await {
            result?;
        }

        let page_scans: Vec<PageScan> = batches
            .iter()
            .flatten()
            .map(|request| PageScan::queued(request.scan_id, request.url.clone()))
            .collect();
        let queued = page_scans.len();

        self.aggregates
            .merge_or_create(
                group_id,
                &WebsiteScanPatch {
                    page_scans: Some(page_scans),
                    ..WebsiteScanPatch::default()
                },
            )
            .await?;

        info!(
            group_id = %group_id,
            queued,
            batches = batches.len(),
            "Queued discovered pages"
        );

        Ok(FeedExpansion {
            queued,
            batches: batches.len(),
        })
    }

    async fn submit(&self, batch: &[ScanFeedRequest]) -> Result<()> {
        let Some(first) = batch.first() else {
            return Ok(());
        };
        let batch_id = first.batch_id;

        self.queue.enqueue(batch).await.map_err(|e| ScanError::FeedQueue {
            batch_id: batch_id.to_string(),
            reason: format!("{e:#}"),
        })?;

        debug!(batch_id = %batch_id, size = batch.len(), "Batch accepted");
        Ok(())
    }
}

/// Known pages without a registered page scan, in known-pages order.
#[must_use]
pub fn pending_urls(aggregate: &WebsiteScanAggregate) -> Vec<String> {
    let registered: HashSet<&str> = aggregate
        .page_scans
        .iter()
        .map(|scan| scan.url.as_str())
        .collect();
    let mut seen = HashSet::new();

    aggregate
        .known_pages
        .iter()
        .filter(|url| !registered.contains(url.as_str()))
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

/// Requests for one batch; scan ids depend only on `(batch_id, url)`.
#[must_use]
pub fn build_batch(
    batch_id: BatchId,
    urls: &[String],
    group_id: &ScanGroupId,
    options: &FeedOptions,
) -> Vec<ScanFeedRequest> {
    urls.iter()
        .map(|url| ScanFeedRequest {
            scan_id: ScanId::derive(batch_id, url),
            batch_id,
            url: url.clone(),
            priority: options.priority,
            deep_scan: options.deep_scan,
            notification_url: options.notification_url.clone(),
            group_id: group_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lumen_db::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingQueue {
        batches: Mutex<Vec<Vec<ScanFeedRequest>>>,
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl FeedQueue for RecordingQueue {
        async fn enqueue(&self, batch: &[ScanFeedRequest]) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on_call == Some(call) {
                anyhow::bail!("queue unavailable");
            }
            self.batches
                .lock()
                .expect("lock")
                .push(batch.to_vec());
            Ok(())
        }
    }

    fn group() -> ScanGroupId {
        ScanGroupId::new("group-1").expect("valid id")
    }

    fn urls(count: usize) -> Vec<String> {
        (0..count).map(|n| format!("https://a.test/{n}")).collect()
    }

    async fn seeded(known: Vec<String>) -> WebsiteScanAccessor {
        let accessor =
            WebsiteScanAccessor::new(Arc::new(MemoryStore::new()), RetryPolicy::once());
        accessor
            .merge_or_create(
                &group(),
                &WebsiteScanPatch {
                    base_url: Some("https://a.test/".to_string()),
                    known_pages: Some(known),
                    ..WebsiteScanPatch::default()
                },
            )
            .await
            .expect("seed aggregate");
        accessor
    }

    fn expander(queue: Arc<RecordingQueue>, aggregates: WebsiteScanAccessor) -> ScanFeedExpander {
        ScanFeedExpander::new(queue, aggregates, &FeedConfig::default(), RetryPolicy::once())
    }

    fn ctx() -> ScanContext {
        ScanContext::new(ScanId::generate(), "https://a.test/", Some(group()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_partitions_into_batches_and_registers_pages() {
        let queue = Arc::new(RecordingQueue::default());
        let aggregates = seeded(urls(45)).await;
        let expander = expander(queue.clone(), aggregates.clone());

        let expansion = expander
            .expand(&ctx(), &group(), &FeedOptions::default())
            .await
            .expect("expand");

        assert_eq!(expansion, FeedExpansion { queued: 45, batches: 3 });
        let mut sizes: Vec<usize> = queue.batches.lock().expect("lock").iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 20, 20]);

        let (aggregate, _) = aggregates.read(&group()).await.expect("read").expect("exists");
        assert_eq!(aggregate.page_scans.len(), 45);
        assert!(pending_urls(&aggregate).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_share_one_batch_id_each() {
        let queue = Arc::new(RecordingQueue::default());
        let expander = expander(queue.clone(), seeded(urls(30)).await);
        expander
            .expand(&ctx(), &group(), &FeedOptions::default())
            .await
            .expect("expand");

        let batches = queue.batches.lock().expect("lock");
        let ids: HashSet<BatchId> = batches.iter().map(|b| b[0].batch_id).collect();
        assert_eq!(ids.len(), 2);
        for batch in batches.iter() {
            assert!(batch.iter().all(|r| r.batch_id == batch[0].batch_id));
            assert!(batch.iter().all(|r| r.scan_id == ScanId::derive(r.batch_id, &r.url)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_a_no_op() {
        let queue = Arc::new(RecordingQueue::default());
        let aggregates = seeded(urls(3)).await;
        let expander = expander(queue.clone(), aggregates.clone());

        expander
            .expand(&ctx(), &group(), &FeedOptions::default())
            .await
            .expect("first run");
        let (_, token_after_first) = aggregates.read(&group()).await.expect("read").expect("exists");

        for _ in 0..2 {
            let again = expander
                .expand(&ctx(), &group(), &FeedOptions::default())
                .await
                .expect("repeat run");
            assert_eq!(again, FeedExpansion::default());
        }

        assert_eq!(queue.calls.load(Ordering::SeqCst), 1);
        let (_, token) = aggregates.read(&group()).await.expect("read").expect("exists");
        assert_eq!(token, token_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_leaves_page_scans_untouched() {
        let queue = Arc::new(RecordingQueue {
            fail_on_call: Some(1),
            ..RecordingQueue::default()
        });
        let aggregates = seeded(urls(60)).await;
        let expander = expander(queue, aggregates.clone());

        let result = expander
            .expand(&ctx(), &group(), &FeedOptions::default())
            .await;

        match result {
            Err(ScanError::ExpansionFailed { source, .. }) => {
                assert!(matches!(*source, ScanError::FeedQueue { .. }));
            }
            other => panic!("expected ExpansionFailed, got {other:?}"),
        }
        let (aggregate, _) = aggregates.read(&group()).await.expect("read").expect("exists");
        assert!(aggregate.page_scans.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_mints_fresh_batch_ids() {
        let queue = Arc::new(RecordingQueue {
            fail_on_call: Some(0),
            ..RecordingQueue::default()
        });
        let aggregates = seeded(urls(2)).await;
        let expander = ScanFeedExpander::new(
            queue.clone(),
            aggregates.clone(),
            &FeedConfig::default(),
            RetryPolicy::new(2, Duration::from_millis(500)),
        );

        let expansion = expander
            .expand(&ctx(), &group(), &FeedOptions::default())
            .await
            .expect("second attempt succeeds");
        assert_eq!(expansion.queued, 2);

        let (aggregate, _) = aggregates.read(&group()).await.expect("read").expect("exists");
        let accepted = queue.batches.lock().expect("lock");
        let registered: HashSet<ScanId> = aggregate.page_scans.iter().map(|s| s.scan_id).collect();
        let submitted: HashSet<ScanId> = accepted[0].iter().map(|r| r.scan_id).collect();
        assert_eq!(registered, submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let queue = Arc::new(RecordingQueue::default());
        let expander = expander(queue.clone(), seeded(urls(40)).await)
            .with_batch_size(2)
            .with_max_concurrent_batches(3);

        let expansion = expander
            .expand(&ctx(), &group(), &FeedOptions::default())
            .await
            .expect("expand");

        assert_eq!(expansion.batches, 20);
        assert!(queue.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_pending_urls_skips_registered_pages() {
        let mut aggregate = WebsiteScanAggregate::new(group(), "https://a.test/");
        aggregate.known_pages = urls(3);
        aggregate
            .page_scans
            .push(PageScan::queued(ScanId::generate(), "https://a.test/1"));

        assert_eq!(pending_urls(&aggregate), vec!["https://a.test/0", "https://a.test/2"]);
    }

    #[test]
    fn test_build_batch_is_deterministic_per_batch_id() {
        let batch_id = BatchId::generate();
        let options = FeedOptions {
            priority: 3,
            deep_scan: true,
            notification_url: None,
        };

        let first = build_batch(batch_id, &urls(2), &group(), &options);
        let again = build_batch(batch_id, &urls(2), &group(), &options);
        let other = build_batch(BatchId::generate(), &urls(2), &group(), &options);

        assert_eq!(first, again);
        assert_ne!(first[0].scan_id, other[0].scan_id);
        assert_eq!(first[0].priority, 3);
    }
}
