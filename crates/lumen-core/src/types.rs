//! Shared types used across Lumen.
//!
//! This module defines the identifier newtypes and the timestamp wrapper
//! used by every shared document.

use crate::error::LumenError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Correlation id tying together all page scans of one logical multi-page scan.
///
/// Group ids are 1-128 characters of ASCII alphanumerics, `-` or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanGroupId(String);

impl ScanGroupId {
    /// Create a new `ScanGroupId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, LumenError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a new random group id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), LumenError> {
        static GROUP_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            GROUP_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(LumenError::Validation(format!(
                "invalid scan group ID: must be 1-128 alphanumeric, '-' or '_' characters, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for ScanGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one page scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(Uuid);

impl ScanId {
    /// Create a new random scan id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derive a scan id from a batch id and a URL.
    ///
    /// The same `(batch, url)` pair always yields the same id (UUID v5 with
    /// the batch id as namespace), so ids are stable across processes and
    /// languages.
    #[must_use]
    pub fn derive(batch: BatchId, url: &str) -> Self {
        Self(Uuid::new_v5(&batch.0, url.as_bytes()))
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ScanId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Random seed minted once per submitted feed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Mint a fresh batch id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for BatchId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a persisted report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Mint a new report id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReportId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Parse a timestamp from an RFC3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, LumenError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| LumenError::Validation(format!("invalid timestamp: {e}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_group_id_valid() {
        for id in ["site-42", "A_b-9", "550e8400-e29b-41d4-a716-446655440000"] {
            assert!(ScanGroupId::new(id).is_ok(), "Failed for: {id}");
        }
    }

    #[test]
    fn test_scan_group_id_invalid() {
        let too_long = "a".repeat(129);
        for id in ["", "has space", "slash/sep", too_long.as_str()] {
            assert!(ScanGroupId::new(id).is_err(), "Should fail for: {id}");
        }
    }

    #[test]
    fn test_scan_id_derivation_is_deterministic() {
        let batch = BatchId::generate();
        let first = ScanId::derive(batch, "https://example.com/a");
        let second = ScanId::derive(batch, "https://example.com/a");
        assert_eq!(first, second);
        assert_ne!(first, ScanId::derive(batch, "https://example.com/b"));
        assert_ne!(
            first,
            ScanId::derive(BatchId::generate(), "https://example.com/a")
        );
    }

    #[test]
    fn test_scan_id_known_vector() {
        // UUID v5 over a fixed namespace is reproducible in any runtime.
        let batch = BatchId::from(
            Uuid::parse_str("6ba7b811-9dad-11d1-80b4-00c04fd430c8").expect("valid uuid"),
        );
        let id = ScanId::derive(batch, "https://example.com/");
        assert_eq!(id.as_uuid().get_version_num(), 5);
        assert_eq!(id, ScanId::derive(batch, "https://example.com/"));
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Timestamp::now();
        let parsed = Timestamp::from_rfc3339(&ts.to_rfc3339()).expect("parse RFC3339 timestamp");
        assert_eq!(ts.as_datetime().timestamp(), parsed.as_datetime().timestamp());
    }

    #[test]
    fn test_group_id_serializes_transparently() {
        let id = ScanGroupId::new("site-1").expect("valid id");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"site-1\"");
    }
}
