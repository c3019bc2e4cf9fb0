//! Databases the migrator can inspect and alter.
//!
//! The [`SchemaTarget`] trait is the migrator's only view of the database:
//! it reads revision stamps, applies revision batches atomically and drops
//! tables. Implementations:
//!
//! - **PostgreSQL**: [`PgSchemaTarget`] in `postgres.rs`
//! - **In-memory**: [`MemoryTarget`] in `memory.rs`, for tests and offline checks

mod memory;
mod postgres;
pub mod revision;
pub mod tls;

pub use memory::MemoryTarget;
pub use postgres::PgSchemaTarget;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::schema::TableRef;

/// Statements bringing a table to one revision, applied in a single
/// transaction. The last statement stamps the revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionBatch {
    pub revision: u32,
    pub statements: Vec<String>,
}

/// Trait for databases holding migrated tables.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a migrator can be shared across
/// async tasks, even though batches are always applied sequentially.
#[async_trait]
pub trait SchemaTarget: Send + Sync {
    /// Stored revision of a table, or `None` if the table does not exist.
    ///
    /// Returns a definition error for a table that exists without a
    /// readable revision stamp.
    async fn table_revision(&self, table: &TableRef) -> Result<Option<u32>>;

    /// Run every statement of `batch` in one serializable transaction.
    ///
    /// On failure the transaction is rolled back and
    /// `MigrateError::Transaction` names the failing statement.
    async fn apply_batch(&self, table: &TableRef, batch: &RevisionBatch) -> Result<()>;

    /// Drop a table if it exists.
    async fn drop_table(&self, table: &TableRef) -> Result<()>;

    /// Check that the database is reachable.
    async fn health_check(&self) -> Result<()>;
}
