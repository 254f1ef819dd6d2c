//! Versioned storage contract.
//!
//! Every shared document is stored as text next to an integer version.
//! A read hands back the version as an opaque [`VersionToken`]; a write names
//! the token it expects to replace. If the stored version moved on, the write
//! is rejected with [`WriteOutcome::Conflict`] and the stored value is left
//! exactly as the winning writer left it.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Opaque marker of the stored version a reader observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionToken(i64);

impl VersionToken {
    pub(crate) const INITIAL: Self = Self(1);

    pub(crate) fn from_version(version: i64) -> Self {
        Self(version)
    }

    pub(crate) fn version(self) -> i64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Precondition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// The document must not exist yet
    IfAbsent,
    /// The stored version must still be the given one
    IfMatch(VersionToken),
}

impl WriteCondition {
    /// Condition for replacing what a read returned (`None` = nothing was there).
    #[must_use]
    pub fn expecting(token: Option<VersionToken>) -> Self {
        match token {
            Some(token) => Self::IfMatch(token),
            None => Self::IfAbsent,
        }
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied; the token identifies the new version
    Written(VersionToken),
    /// Another writer got there first; nothing was changed
    Conflict,
}

/// A stored document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Raw document text
    pub content: String,
    /// Version the content was read at
    pub token: VersionToken,
}

/// Keyed store with conditional writes.
///
/// Used both for the website scan aggregates and for the combined results
/// payloads; each lives in its own collection.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Read a document. A missing id is `Ok(None)`, never an error.
    async fn read(&self, id: &str) -> Result<Option<Versioned>>;

    /// Write a document if `condition` still holds.
    async fn write(
        &self,
        id: &str,
        content: &str,
        condition: WriteCondition,
    ) -> Result<WriteOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_from_token() {
        assert_eq!(WriteCondition::expecting(None), WriteCondition::IfAbsent);
        let token = VersionToken::from_version(3);
        assert_eq!(
            WriteCondition::expecting(Some(token)),
            WriteCondition::IfMatch(token)
        );
    }

    #[test]
    fn test_token_progression() {
        assert_eq!(VersionToken::INITIAL.next().version(), 2);
        assert_eq!(VersionToken::from_version(7).to_string(), "v7");
    }
}
