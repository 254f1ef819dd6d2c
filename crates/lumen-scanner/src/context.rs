//! Per-page logging context handed to every coordinator.

use crate::collaborators::PageScanOutcome;
use lumen_core::{ScanGroupId, ScanId};
use tracing::Span;

/// Identifies the page a coordinator works for and carries its span.
///
/// Coordinators never look up ambient state to find out which page they are
/// serving; everything they log is recorded inside [`ScanContext::span`].
#[derive(Debug, Clone)]
pub struct ScanContext {
    scan_id: ScanId,
    url: String,
    group_id: Option<ScanGroupId>,
    span: Span,
}

impl ScanContext {
    /// Context with a fresh `page_scan` span.
    #[must_use]
    pub fn new(scan_id: ScanId, url: impl Into<String>, group_id: Option<ScanGroupId>) -> Self {
        let url = url.into();
        let span = tracing::info_span!(
            "page_scan",
            scan_id = %scan_id,
            url = %url,
            group_id = tracing::field::Empty,
        );
        if let Some(group_id) = &group_id {
            span.record("group_id", tracing::field::display(group_id));
        }

        Self {
            scan_id,
            url,
            group_id,
            span,
        }
    }

    /// Context for a finished page scan.
    #[must_use]
    pub fn for_outcome(outcome: &PageScanOutcome) -> Self {
        let group_id = outcome
            .website
            .as_ref()
            .and_then(|website| website.group_id.clone());
        Self::new(outcome.scan_id, outcome.scanned_url.clone(), group_id)
    }

    /// Replace the span, e.g. with one created by the hosting worker.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Scan id of the page.
    #[must_use]
    pub fn scan_id(&self) -> ScanId {
        self.scan_id
    }

    /// Page URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scan group, if the page belongs to one.
    #[must_use]
    pub fn group_id(&self) -> Option<&ScanGroupId> {
        self.group_id.as_ref()
    }

    /// Span all work for this page is recorded in.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }
}
