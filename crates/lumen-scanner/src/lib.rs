//! Lumen Scanner - Site-wide aggregation for multi-page accessibility scans.
//!
//! Every page of a site is scanned by an independent worker. This crate holds
//! what happens after a page finishes: folding its results into the scan
//! group's combined results, keeping the consolidated report current,
//! discovering further pages and queueing them. All shared state lives in
//! versioned documents; concurrent workers resolve lost races by re-reading
//! and retrying, never by locking.
//!
//! # Features
//!
//! - Conditional-write accessors for the website scan aggregate and the combined results
//! - Consolidated reports that keep one report id per group
//! - Deep-scan discovery bounded by a per-group page limit
//! - Idempotent feed expansion with deterministic scan ids per batch
//! - One retry abstraction with per-call-site budgets
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_scanner::{PostScanPipeline, ScanContext, WebsiteScanAccessor};
//!
//! let pipeline = PostScanPipeline::new(aggregates.clone(), &config)
//!     .with_consolidation(consolidation)
//!     .with_deep_scan(deep_scan);
//!
//! let ctx = ScanContext::for_outcome(&outcome);
//! let summary = pipeline.process(&ctx, &outcome).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod accumulator;
pub mod aggregate_store;
pub mod collaborators;
pub mod combined_store;
pub mod consolidation;
pub mod context;
pub mod deep_scan;
#[allow(missing_docs)]
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod retry;
pub mod urls;

// Re-export commonly used types
pub use accumulator::{fold_page, CombinedResultAccumulator, MergedResults};
pub use aggregate_store::{apply_patch, create_from_patch, WebsiteScanAccessor};
pub use collaborators::{
    BrowserHandle, BrowserMetadata, CrawlEngine, CrawlRequest, FeedQueue, PageScanOutcome,
    ReportMetadata, ReportRenderer, ReportStore, ScanFeedRequest, WebsiteScanRequest,
};
pub use combined_store::{CombinedResultsAccessor, CombinedResultsSnapshot};
pub use consolidation::ConsolidationCoordinator;
pub use context::ScanContext;
pub use deep_scan::{DeepScanCoordinator, DeepScanOutcome};
pub use error::{Result, ScanError};
pub use feed::{build_batch, pending_urls, FeedExpansion, FeedOptions, ScanFeedExpander};
pub use pipeline::{PostScanPipeline, PostScanSummary, StageStatus};
pub use retry::{RetryOrchestrator, RetryPolicy, Retryable};
pub use urls::{dedupe_urls, discovery_pattern_for, process_discovered_urls, ScopeFilter};
