//! Lumen Database Layer
//!
//! Versioned storage for the documents that many page-scan processes of one
//! scan group share: the website scan aggregate and the combined results
//! payload.
//!
//! # Architecture
//!
//! - **Optimistic concurrency**: every read returns a [`VersionToken`]; every
//!   write is conditional on one. A lost race is a [`WriteOutcome::Conflict`],
//!   not an error.
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Backends**: [`SqliteStore`] for persistence, [`MemoryStore`] for tests
//!
//! # Example
//!
//! ```ignore
//! use lumen_db::{Database, VersionedStore, WriteCondition};
//!
//! let db = Database::new("lumen.db", 5).await?;
//! db.run_migrations().await?;
//! db.website_scans().write("group-1", "{}", WriteCondition::IfAbsent).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use connection::StoragePool;
pub use error::{DatabaseError, Result};
pub use memory::MemoryStore;
pub use sqlite::{Collection, SqliteStore};
pub use store::{Versioned, VersionedStore, VersionToken, WriteCondition, WriteOutcome};

use std::path::Path;

/// High-level database interface with migrations.
#[derive(Debug, Clone)]
pub struct Database {
    pool: StoragePool,
}

impl Database {
    /// Open a database.
    ///
    /// # Arguments
    /// * `path` - Path to the database file (or `:memory:` for in-memory)
    /// * `max_connections` - Pool size
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let pool = StoragePool::new(path, max_connections).await?;
        Ok(Self { pool })
    }

    /// Create a database instance from an existing pool.
    #[must_use]
    pub fn from_pool(pool: StoragePool) -> Self {
        Self { pool }
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Store for website scan aggregates.
    #[must_use]
    pub fn website_scans(&self) -> SqliteStore {
        SqliteStore::new(self.pool.pool().clone(), Collection::WebsiteScans)
    }

    /// Store for combined results payloads.
    #[must_use]
    pub fn combined_results(&self) -> SqliteStore {
        SqliteStore::new(self.pool.pool().clone(), Collection::CombinedResults)
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
