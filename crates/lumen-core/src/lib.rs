//! Lumen Core - Foundation crate for the Lumen site accessibility scanner.
//!
//! This crate provides the shared identifiers, the documents that page-scan
//! processes share per scan group, error handling, configuration and logging
//! setup that the other Lumen crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Identifier newtypes (`ScanGroupId`, `ScanId`, `BatchId`, `ReportId`) and `Timestamp`
//! - [`website_scan`] - The per-group website scan aggregate and its patch type
//! - [`axe`] - Per-page rule results and the combined per-group results
//! - [`logging`] - Tracing subscriber initialisation
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{AppConfig, ScanGroupId, WebsiteScanAggregate};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.feed.batch_size, 20);
//!
//! let group = ScanGroupId::new("site-42")?;
//! let aggregate = WebsiteScanAggregate::new(group, "https://example.com/");
//! assert!(aggregate.known_pages.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod axe;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod website_scan;

// Re-export commonly used types
pub use axe::{
    AggregatedRule, AxeNode, AxeResults, AxeRule, CombinedAxeResults, CombinedRuleSets,
    RuleUrlEntry, UrlCount,
};
pub use config::{
    AppConfig, DeepScanConfig, FeedConfig, LoggingConfig, RetryConfig, RetryPolicyConfig,
    StorageConfig,
};
pub use error::{ConfigError, ConfigResult, LumenError, Result};
pub use types::{BatchId, ReportId, ScanGroupId, ScanId, Timestamp};
pub use website_scan::{
    PageScan, ReportFormat, ReportRef, RunState, WebsiteScanAggregate, WebsiteScanPatch,
};
