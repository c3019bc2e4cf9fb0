//! Migration runner.
//!
//! [`Migrator`] plans an element list against a [`SchemaTarget`] and then
//! applies the plan table by table, one transaction per revision batch.
//! A failed batch is rolled back and stops the run; batches committed
//! before it stay applied.

pub mod plan;

pub use plan::{build_plan, MigrationPlan, PlanAction, TablePlan};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MigrationOptions;
use crate::error::Result;
use crate::schema::element::MigrationElement;
use crate::target::SchemaTarget;

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Tables created from scratch.
    pub tables_created: Vec<String>,

    /// Existing tables brought forward.
    pub tables_upgraded: Vec<String>,

    /// Tables already at the declared revision.
    pub tables_unchanged: Vec<String>,

    /// Tables whose stored revision is newer than the definition.
    pub tables_ahead: Vec<String>,

    /// Revision transactions committed.
    pub batches_applied: usize,

    /// Statements executed, revision stamps included.
    pub statements_executed: usize,

    /// Stored revision of every table after the run.
    pub revisions: BTreeMap<String, u32>,
}

impl MigrationReport {
    /// Serialize the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Stored versus declared revision of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub table: String,
    pub stored_revision: Option<u32>,
    pub declared_revision: u32,
}

impl TableStatus {
    pub fn is_current(&self) -> bool {
        self.stored_revision == Some(self.declared_revision)
    }
}

/// Applies element lists to the tables of one schema.
pub struct Migrator {
    target: Arc<dyn SchemaTarget>,
    schema: String,
    options: MigrationOptions,
}

impl Migrator {
    /// Create a migrator for tables in `schema`.
    pub fn new(target: Arc<dyn SchemaTarget>, schema: impl Into<String>) -> Self {
        Self {
            target,
            schema: schema.into(),
            options: MigrationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Work out what [`migrate`](Self::migrate) would do, without changing
    /// anything.
    pub async fn plan(&self, elements: &[MigrationElement]) -> Result<MigrationPlan> {
        build_plan(self.target.as_ref(), &self.schema, &self.options, elements).await
    }

    /// Bring every table in `elements` to its declared revision.
    pub async fn migrate(&self, elements: &[MigrationElement]) -> Result<MigrationReport> {
        let plan = self.plan(elements).await?;
        self.apply(&plan).await
    }

    /// Apply a previously built plan.
    pub async fn apply(&self, plan: &MigrationPlan) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting schema migration run: {}", run_id);

        let mut report = MigrationReport {
            run_id,
            duration_seconds: 0.0,
            started_at,
            completed_at: started_at,
            tables_created: Vec::new(),
            tables_upgraded: Vec::new(),
            tables_unchanged: Vec::new(),
            tables_ahead: Vec::new(),
            batches_applied: 0,
            statements_executed: 0,
            revisions: BTreeMap::new(),
        };

        for table_plan in &plan.tables {
            let table = &table_plan.table;
            let name = table.to_string();

            match &table_plan.action {
                PlanAction::UpToDate => {
                    debug!(
                        "Table {} is up to date at revision {}",
                        table, table_plan.declared_revision
                    );
                    report.tables_unchanged.push(name.clone());
                }
                PlanAction::Ahead => {
                    warn!(
                        "Table {} is at revision {:?}, newer than declared revision {}",
                        table, table_plan.stored_revision, table_plan.declared_revision
                    );
                    report.tables_ahead.push(name.clone());
                }
                PlanAction::Create {
                    drop_statement,
                    batch,
                } => {
                    if drop_statement.is_some() {
                        info!("Dropping table {} before migrating", table);
                        self.target.drop_table(table).await?;
                        report.statements_executed += 1;
                    }
                    info!("Creating table {} at revision {}", table, batch.revision);
                    self.target.apply_batch(table, batch).await?;
                    report.batches_applied += 1;
                    report.statements_executed += batch.statements.len();
                    report.tables_created.push(name.clone());
                }
                PlanAction::Upgrade { batches } => {
                    for batch in batches {
                        info!("Migrating table {} to revision {}", table, batch.revision);
                        self.target.apply_batch(table, batch).await?;
                        report.batches_applied += 1;
                        report.statements_executed += batch.statements.len();
                    }
                    report.tables_upgraded.push(name.clone());
                }
            }

            let revision = match &table_plan.action {
                PlanAction::Ahead => table_plan.stored_revision,
                _ => Some(table_plan.declared_revision),
            };
            if let Some(revision) = revision {
                report.revisions.insert(name, revision);
            }
        }

        report.completed_at = Utc::now();
        report.duration_seconds = start.elapsed().as_secs_f64();
        info!(
            "Schema migration complete: {} created, {} upgraded, {} unchanged, {} batches in {:.2}s",
            report.tables_created.len(),
            report.tables_upgraded.len(),
            report.tables_unchanged.len(),
            report.batches_applied,
            report.duration_seconds
        );
        Ok(report)
    }

    /// Stored and declared revision of every table in `elements`.
    pub async fn revisions(&self, elements: &[MigrationElement]) -> Result<Vec<TableStatus>> {
        let plan = self.plan(elements).await?;
        Ok(plan
            .tables
            .iter()
            .map(|t| TableStatus {
                table: t.table.to_string(),
                stored_revision: t.stored_revision,
                declared_revision: t.declared_revision,
            })
            .collect())
    }
}
