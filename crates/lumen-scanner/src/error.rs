use lumen_core::ScanGroupId;
use lumen_db::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("page scan {scan_id} has no scan group reference")]
    MissingScanGroup { scan_id: String },

    #[error("concurrent modification of {resource}")]
    ConcurrentModification { resource: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] DatabaseError),

    #[error("corrupt state in {resource}: {reason}")]
    CorruptState { resource: String, reason: String },

    #[error("consolidation failed for scan group {group_id}: {source}")]
    ConsolidationFailed {
        group_id: ScanGroupId,
        #[source]
        source: Box<ScanError>,
    },

    #[error("feed expansion failed for scan group {group_id}: {source}")]
    ExpansionFailed {
        group_id: ScanGroupId,
        #[source]
        source: Box<ScanError>,
    },

    #[error("feed queue rejected batch {batch_id}: {reason}")]
    FeedQueue { batch_id: String, reason: String },

    #[error("report generation failed: {0}")]
    Report(String),
}

impl ScanError {
    /// Whether repeating the failed operation (after re-reading) can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification { .. }
            | Self::StorageUnavailable(_)
            | Self::FeedQueue { .. }
            | Self::Report(_) => true,
            Self::MissingScanGroup { .. }
            | Self::CorruptState { .. }
            | Self::ConsolidationFailed { .. }
            | Self::ExpansionFailed { .. } => false,
        }
    }

    /// Whether the failure needs operator attention.
    #[must_use]
    pub fn requires_alert(&self) -> bool {
        match self {
            Self::CorruptState { .. } => true,
            Self::ConsolidationFailed { source, .. } | Self::ExpansionFailed { source, .. } => {
                source.requires_alert()
            }
            _ => false,
        }
    }

    pub(crate) fn conflict(resource: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            resource: resource.into(),
        }
    }

    pub(crate) fn corrupt(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorruptState {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
