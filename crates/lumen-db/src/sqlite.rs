//! SQLite-backed [`VersionedStore`].
//!
//! One table per collection, each row `(id, content, version, updated_at)`.
//! Conditional writes are single statements whose `rows_affected` tells a
//! conflict apart from a success, so no transaction spans a read and a write.

use crate::error::Result;
use crate::store::{Versioned, VersionedStore, VersionToken, WriteCondition, WriteOutcome};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

/// Collections persisted by Lumen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// One aggregate document per scan group
    WebsiteScans,
    /// Combined results payloads
    CombinedResults,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Self::WebsiteScans => "website_scans",
            Self::CombinedResults => "combined_results",
        }
    }
}

/// Versioned store over one SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    collection: Collection,
}

impl SqliteStore {
    /// Create a store over the given collection.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>, collection: Collection) -> Self {
        Self { pool, collection }
    }

    /// Collection this store reads and writes.
    #[must_use]
    pub fn collection(&self) -> Collection {
        self.collection
    }
}

#[async_trait]
impl VersionedStore for SqliteStore {
    async fn read(&self, id: &str) -> Result<Option<Versioned>> {
        let sql = format!(
            "SELECT content, version FROM {} WHERE id = ?",
            self.collection.table()
        );

        let row = sqlx::query_as::<_, (String, i64)>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(content, version)| Versioned {
            content,
            token: VersionToken::from_version(version),
        }))
    }

    async fn write(
        &self,
        id: &str,
        content: &str,
        condition: WriteCondition,
    ) -> Result<WriteOutcome> {
        let table = self.collection.table();
        let updated_at = Utc::now().to_rfc3339();

        let (result, next) = match condition {
            WriteCondition::IfAbsent => {
                let sql = format!(
                    "INSERT INTO {table} (id, content, version, updated_at) VALUES (?, ?, ?, ?)
                     ON CONFLICT(id) DO NOTHING"
                );
                let result = sqlx::query(&sql)
                    .bind(id)
                    .bind(content)
                    .bind(VersionToken::INITIAL.version())
                    .bind(&updated_at)
                    .execute(&self.pool)
                    .await?;
                (result, VersionToken::INITIAL)
            }
            WriteCondition::IfMatch(expected) => {
                let sql = format!(
                    "UPDATE {table} SET content = ?, version = ?, updated_at = ?
                     WHERE id = ? AND version = ?"
                );
                let next = expected.next();
                let result = sqlx::query(&sql)
                    .bind(content)
                    .bind(next.version())
                    .bind(&updated_at)
                    .bind(id)
                    .bind(expected.version())
                    .execute(&self.pool)
                    .await?;
                (result, next)
            }
        };

        if result.rows_affected() == 0 {
            tracing::debug!(table, id, ?condition, "conditional write lost");
            Ok(WriteOutcome::Conflict)
        } else {
            Ok(WriteOutcome::Written(next))
        }
    }
}
