//! Page discovery for deep scans.
//!
//! After a page of a deep-scan group finishes, the coordinator crawls from
//! it, records new in-scope pages on the group's aggregate (up to the
//! discovery limit) and hands the group to the feed expander.

use crate::aggregate_store::WebsiteScanAccessor;
use crate::collaborators::{CrawlEngine, CrawlRequest, PageScanOutcome, WebsiteScanRequest};
use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::feed::{FeedExpansion, FeedOptions, ScanFeedExpander};
use crate::retry::RetryOrchestrator;
use crate::urls::{dedupe_urls, discovery_pattern_for, process_discovered_urls, ScopeFilter};
use lumen_core::{AppConfig, ScanGroupId, WebsiteScanAggregate, WebsiteScanPatch};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// How a deep scan step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepScanOutcome {
    /// The group already knows `limit` pages; nothing was crawled
    LimitReached {
        /// Pages known to the group
        known_pages: usize,
        /// Limit in effect
        limit: usize,
    },
    /// Discovery ran and the feed was expanded
    Expanded {
        /// Newly recorded pages
        discovered: usize,
        /// What the feed expander queued
        expansion: FeedExpansion,
    },
}

/// Drives discovery for one finished page.
pub struct DeepScanCoordinator {
    crawler: Arc<dyn CrawlEngine>,
    aggregates: WebsiteScanAccessor,
    feed: ScanFeedExpander,
    discovery_limit: usize,
    default_priority: i32,
    update_retry: RetryOrchestrator,
}

impl DeepScanCoordinator {
    /// Create a coordinator using limits and retry budgets from `config`.
    #[must_use]
    pub fn new(
        crawler: Arc<dyn CrawlEngine>,
        aggregates: WebsiteScanAccessor,
        feed: ScanFeedExpander,
        config: &AppConfig,
    ) -> Self {
        Self {
            crawler,
            aggregates,
            feed,
            discovery_limit: config.deep_scan.discovery_limit,
            default_priority: config.feed.priority,
            update_retry: RetryOrchestrator::new(
                "deep_scan_update",
                config.retry.aggregate_update.into(),
            ),
        }
    }

    /// Run discovery for `outcome`.
    ///
    /// Fails with [`ScanError::MissingScanGroup`] if the page has no scan
    /// group. Crawl failures are logged and treated as "nothing found".
    pub async fn run(&self, ctx: &ScanContext, outcome: &PageScanOutcome) -> Result<DeepScanOutcome> {
        self.run_inner(ctx, outcome)
            .instrument(ctx.span().clone())
            .await
    }

    async fn run_inner(&self, ctx: &ScanContext, outcome: &PageScanOutcome) -> Result<DeepScanOutcome> {
        let (website, group_id) = scan_group(outcome)?;
        let limit = website.discovery_limit.unwrap_or(self.discovery_limit);

        let (mut aggregate, existed) = match self.aggregates.read(group_id).await? {
            Some((aggregate, _)) => (aggregate, true),
            None => (
                WebsiteScanAggregate::new(group_id.clone(), &website.base_url),
                false,
            ),
        };

        // Pages supplied with the request count towards the limit.
        let supplied: Vec<String> = website
            .known_pages
            .iter()
            .filter(|url| !aggregate.known_pages.contains(url))
            .cloned()
            .collect();
        if !supplied.is_empty() {
            aggregate.known_pages = dedupe_urls(&aggregate.known_pages, &supplied);
        }

        if aggregate.known_pages.len() >= limit {
            info!(
                known_pages = aggregate.known_pages.len(),
                limit, "Discovery limit reached, skipping crawl"
            );
            return Ok(DeepScanOutcome::LimitReached {
                known_pages: aggregate.known_pages.len(),
                limit,
            });
        }

        let patterns = Self::discovery_patterns(&aggregate, website);
        let crawled = self.crawl(outcome, &aggregate, &patterns).await;

        let scope = ScopeFilter::new(&patterns);
        let in_scope: Vec<String> = crawled
            .into_iter()
            .filter(|url| scope.is_in_scope(url))
            .collect();
        let discovered = process_discovered_urls(&in_scope, limit, Some(&aggregate.known_pages));

        debug!(
            crawled = in_scope.len(),
            new = discovered.len(),
            "Processed discovered URLs"
        );

        if !existed
            || !supplied.is_empty()
            || !discovered.is_empty()
            || patterns != aggregate.discovery_patterns
        {
            let patch = WebsiteScanPatch {
                base_url: (!existed).then(|| aggregate.base_url.clone()),
                known_pages: Some(dedupe_urls(&aggregate.known_pages, &discovered)),
                discovery_patterns: Some(patterns),
                ..WebsiteScanPatch::default()
            };
            self.update_retry
                .run(|_| self.aggregates.merge_or_create(group_id, &patch))
                .await?;
        }

        let options = FeedOptions {
            priority: website.priority.unwrap_or(self.default_priority),
            deep_scan: true,
            notification_url: website.notification_url.clone(),
        };
        let expansion = self.feed.expand(ctx, group_id, &options).await?;

        Ok(DeepScanOutcome::Expanded {
            discovered: discovered.len(),
            expansion,
        })
    }

    fn discovery_patterns(
        aggregate: &WebsiteScanAggregate,
        website: &WebsiteScanRequest,
    ) -> Vec<String> {
        if !aggregate.discovery_patterns.is_empty() {
            return aggregate.discovery_patterns.clone();
        }
        if !website.discovery_patterns.is_empty() {
            return website.discovery_patterns.clone();
        }

        match discovery_pattern_for(&aggregate.base_url) {
            Ok(pattern) => vec![pattern],
            Err(e) => {
                warn!(base_url = %aggregate.base_url, error = %e, "Cannot derive discovery pattern");
                Vec::new()
            }
        }
    }

    async fn crawl(
        &self,
        outcome: &PageScanOutcome,
        aggregate: &WebsiteScanAggregate,
        patterns: &[String],
    ) -> Vec<String> {
        let request = CrawlRequest {
            base_url: &aggregate.base_url,
            discovery_patterns: patterns,
            seed_links: &outcome.discovered_links,
            browser: outcome.browser_handle.as_ref(),
        };

        match self.crawler.crawl(request).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Crawl failed, continuing without discovered pages");
                Vec::new()
            }
        }
    }
}

/// Site-level request and group id of a page, or `MissingScanGroup`.
pub(crate) fn scan_group(outcome: &PageScanOutcome) -> Result<(&WebsiteScanRequest, &ScanGroupId)> {
    outcome
        .website
        .as_ref()
        .and_then(|website| website.group_id.as_ref().map(|group_id| (website, group_id)))
        .ok_or_else(|| ScanError::MissingScanGroup {
            scan_id: outcome.scan_id.to_string(),
        })
}
