//! In-memory schema target.
//!
//! Tracks table revisions and records every applied batch instead of running
//! SQL. Used by tests and by the offline `check` command.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, error};

use super::revision::parse_stamp;
use super::{RevisionBatch, SchemaTarget};
use crate::error::{MigrateError, Result};
use crate::schema::TableRef;

#[derive(Debug, Default)]
struct State {
    /// Stored revision per qualified table name; `None` = exists unstamped.
    tables: HashMap<String, Option<u32>>,
    applied: Vec<(String, RevisionBatch)>,
    dropped: Vec<String>,
    fail_on: Option<String>,
}

/// Schema target that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<State>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing table at `revision`.
    pub fn with_table(self, table: &TableRef, revision: u32) -> Self {
        self.lock().tables.insert(table.to_string(), Some(revision));
        self
    }

    /// Seed an existing table that has no revision stamp.
    pub fn with_unstamped_table(self, table: &TableRef) -> Self {
        self.lock().tables.insert(table.to_string(), None);
        self
    }

    /// Fail any batch containing a statement that includes `pattern`.
    pub fn fail_on(self, pattern: impl Into<String>) -> Self {
        self.lock().fail_on = Some(pattern.into());
        self
    }

    /// Batches applied so far, with their qualified table name.
    pub fn applied(&self) -> Vec<(String, RevisionBatch)> {
        self.lock().applied.clone()
    }

    /// Every statement applied so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock()
            .applied
            .iter()
            .flat_map(|(_, batch)| batch.statements.iter().cloned())
            .collect()
    }

    /// Tables dropped so far.
    pub fn dropped(&self) -> Vec<String> {
        self.lock().dropped.clone()
    }

    /// Current stored revision of a table, if it exists and is stamped.
    pub fn revision_of(&self, table: &TableRef) -> Option<u32> {
        self.lock().tables.get(&table.to_string()).copied().flatten()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SchemaTarget for MemoryTarget {
    async fn table_revision(&self, table: &TableRef) -> Result<Option<u32>> {
        match self.lock().tables.get(&table.to_string()) {
            None => Ok(None),
            Some(Some(revision)) => Ok(Some(*revision)),
            Some(None) => parse_stamp(table, None).map(Some),
        }
    }

    async fn apply_batch(&self, table: &TableRef, batch: &RevisionBatch) -> Result<()> {
        let mut state = self.lock();

        if let Some(pattern) = &state.fail_on {
            if let Some(statement) = batch.statements.iter().find(|s| s.contains(pattern.as_str())) {
                error!(
                    "Migration of table {} to revision {} failed\n  Statement: {}",
                    table, batch.revision, statement
                );
                return Err(MigrateError::Transaction {
                    table: table.to_string(),
                    revision: batch.revision,
                    statement: statement.clone(),
                    source: format!("injected failure on {:?}", pattern).into(),
                });
            }
        }

        for statement in &batch.statements {
            debug!("{}: {}", table, statement);
        }
        state.tables.insert(table.to_string(), Some(batch.revision));
        state.applied.push((table.to_string(), batch.clone()));
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        let mut state = self.lock();
        state.tables.remove(&table.to_string());
        state.dropped.push(table.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef::new("public", "inventory")
    }

    fn batch(revision: u32) -> RevisionBatch {
        RevisionBatch {
            revision,
            statements: vec![format!("COMMENT ON TABLE \"public\".\"inventory\" IS '{}'", revision)],
        }
    }

    #[tokio::test]
    async fn test_absent_table_has_no_revision() {
        let target = MemoryTarget::new();
        assert_eq!(target.table_revision(&table()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_apply_batch_advances_revision() {
        let target = MemoryTarget::new().with_table(&table(), 1);
        target.apply_batch(&table(), &batch(2)).await.unwrap();
        assert_eq!(target.table_revision(&table()).await.unwrap(), Some(2));
        assert_eq!(target.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_revision() {
        let target = MemoryTarget::new().with_table(&table(), 1).fail_on("IS '2'");
        let err = target.apply_batch(&table(), &batch(2)).await.unwrap_err();
        assert!(err.is_transactional());
        assert_eq!(target.revision_of(&table()), Some(1));
        assert!(target.applied().is_empty());
    }

    #[tokio::test]
    async fn test_unstamped_table_is_rejected() {
        let target = MemoryTarget::new().with_unstamped_table(&table());
        assert!(target.table_revision(&table()).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_table() {
        let target = MemoryTarget::new().with_table(&table(), 4);
        target.drop_table(&table()).await.unwrap();
        assert_eq!(target.table_revision(&table()).await.unwrap(), None);
        assert_eq!(target.dropped(), vec!["public.inventory".to_string()]);
    }
}
