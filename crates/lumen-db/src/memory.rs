//! In-memory [`VersionedStore`] for tests and development.
//!
//! Applies the same token rules as the SQLite store. Data is lost when the
//! store is dropped.

use crate::error::Result;
use crate::store::{Versioned, VersionedStore, VersionToken, WriteCondition, WriteOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Versioned documents held in a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, (String, VersionToken)>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn read(&self, id: &str) -> Result<Option<Versioned>> {
        Ok(self
            .documents
            .read()
            .await
            .get(id)
            .map(|(content, token)| Versioned {
                content: content.clone(),
                token: *token,
            }))
    }

    async fn write(
        &self,
        id: &str,
        content: &str,
        condition: WriteCondition,
    ) -> Result<WriteOutcome> {
        let mut documents = self.documents.write().await;
        let current = documents.get(id).map(|(_, token)| *token);

        let next = match (condition, current) {
            (WriteCondition::IfAbsent, None) => VersionToken::INITIAL,
            (WriteCondition::IfMatch(expected), Some(stored)) if expected == stored => {
                stored.next()
            }
            _ => return Ok(WriteOutcome::Conflict),
        };

        documents.insert(id.to_string(), (content.to_string(), next));
        Ok(WriteOutcome::Written(next))
    }
}
