//! Walking an element list against the stored revisions.
//!
//! Planning is a pure dry run: it reads revision stamps but never alters the
//! database. Every definition error surfaces here, before any SQL runs.
//!
//! Per table the walk goes through these states:
//!
//! ```text
//! Table(name) ──> accumulating revision 1 ──Revision(2)──> ... ──> finished
//!                        │
//!                        └─ past max_revision ──> skipping until the next Table
//! ```
//!
//! While accumulating, every element updates the table's column and key
//! model. If the table already exists and the current revision is newer than
//! its stamp, the element's SQL also goes into that revision's batch. A table
//! that does not exist yet gets a single `CREATE TABLE` from the final model.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MigrationOptions;
use crate::error::{MigrateError, Result};
use crate::schema::element::{
    render_add_column, render_add_primary_key, render_create_table, render_drop_column,
    render_drop_index, render_drop_primary_key, render_drop_table, ChangeColumn,
    MigrationElement, NamedKey, TableRef,
};
use crate::schema::types::ColumnSpec;
use crate::target::revision::stamp_statement;
use crate::target::{RevisionBatch, SchemaTarget};

/// What migrating one table will do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    /// Stored revision matches the definition.
    UpToDate,

    /// Table is absent (or will be dropped first) and is created at the
    /// final revision in one batch.
    Create {
        #[serde(skip_serializing_if = "Option::is_none")]
        drop_statement: Option<String>,
        batch: RevisionBatch,
    },

    /// Table exists at an older revision; one batch per missing revision.
    Upgrade { batches: Vec<RevisionBatch> },

    /// Stored revision is newer than the definition. Left untouched.
    Ahead,
}

/// Plan for a single table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    pub table: TableRef,

    /// Revision stamped on the live table; `None` when absent.
    pub stored_revision: Option<u32>,

    /// Highest revision the definition reaches (capped by `max_revision`).
    pub declared_revision: u32,

    #[serde(flatten)]
    pub action: PlanAction,
}

impl TablePlan {
    /// Batches this plan applies, in order.
    pub fn batches(&self) -> Vec<&RevisionBatch> {
        match &self.action {
            PlanAction::Create { batch, .. } => vec![batch],
            PlanAction::Upgrade { batches } => batches.iter().collect(),
            PlanAction::UpToDate | PlanAction::Ahead => Vec::new(),
        }
    }

    /// Every statement this plan executes, in order.
    pub fn statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        if let PlanAction::Create {
            drop_statement: Some(drop),
            ..
        } = &self.action
        {
            statements.push(drop.clone());
        }
        for batch in self.batches() {
            statements.extend(batch.statements.iter().cloned());
        }
        statements
    }
}

/// Plan for a whole element list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationPlan {
    pub tables: Vec<TablePlan>,
}

impl MigrationPlan {
    /// Every statement the plan executes, across all tables.
    pub fn statements(&self) -> Vec<String> {
        self.tables.iter().flat_map(|t| t.statements()).collect()
    }

    /// Number of transactions the plan runs.
    pub fn batch_count(&self) -> usize {
        self.tables.iter().map(|t| t.batches().len()).sum()
    }

    /// Whether applying the plan would change nothing.
    pub fn is_up_to_date(&self) -> bool {
        self.batch_count() == 0
    }
}

/// Build a plan by reading each table's stamp from `target`.
pub async fn build_plan<T: SchemaTarget + ?Sized>(
    target: &T,
    schema: &str,
    options: &MigrationOptions,
    elements: &[MigrationElement],
) -> Result<MigrationPlan> {
    let mut plan = MigrationPlan::default();
    let mut seen = HashSet::new();
    let mut run: Option<TableRun> = None;

    for element in elements {
        match element {
            MigrationElement::Table(name) => {
                if let Some(done) = run.take() {
                    plan.tables.push(done.finish()?);
                }
                if !seen.insert(name.as_str()) {
                    return Err(MigrateError::definition(
                        name.as_str(),
                        "table is declared more than once",
                    ));
                }

                let table = TableRef::new(schema, name.as_str());
                table
                    .qualified()
                    .map_err(|e| MigrateError::definition(name.as_str(), e.to_string()))?;

                let stored = target.table_revision(&table).await?;
                let drop_existing = options.delete_before_migrating && stored.is_some();
                run = Some(TableRun::new(
                    table,
                    stored,
                    drop_existing,
                    options.max_revision,
                )?);
            }
            other => match run.as_mut() {
                Some(current) => current.apply(other)?,
                None => {
                    return Err(MigrateError::definition(
                        "(none)",
                        format!("{} appears before any table", other.describe()),
                    ))
                }
            },
        }
    }

    if let Some(done) = run {
        plan.tables.push(done.finish()?);
    }
    Ok(plan)
}

/// Accumulated state of one table while its elements are walked.
#[derive(Debug)]
pub(crate) struct TableRun {
    table: TableRef,

    /// Stamp of the live table. `None` when absent or about to be dropped.
    stored: Option<u32>,
    /// Stamp the table had before `delete_before_migrating` discarded it.
    dropped_revision: Option<u32>,
    max_revision: Option<u32>,

    revision: u32,
    /// Last `Revision` marker read, including those past `max_revision`.
    last_seen: u32,
    skipping: bool,

    columns: Vec<ColumnSpec>,
    dropped_columns: Vec<ColumnSpec>,
    primary_key: Option<Vec<String>>,
    keys: Vec<NamedKey>,

    open: Option<RevisionBatch>,
    batches: Vec<RevisionBatch>,
}

impl TableRun {
    pub(crate) fn new(
        table: TableRef,
        stored: Option<u32>,
        drop_existing: bool,
        max_revision: Option<u32>,
    ) -> Result<Self> {
        let (stored, dropped_revision) = if drop_existing {
            (None, stored)
        } else {
            (stored, None)
        };

        let mut run = Self {
            table,
            stored,
            dropped_revision,
            max_revision,
            revision: 1,
            last_seen: 1,
            skipping: false,
            columns: Vec::new(),
            dropped_columns: Vec::new(),
            primary_key: None,
            keys: Vec::new(),
            open: None,
            batches: Vec::new(),
        };
        if max_revision.is_some_and(|max| max < 1) {
            return run.fail("max_revision must be at least 1");
        }
        run.open_batch();
        Ok(run)
    }

    /// Feed one non-table element.
    pub(crate) fn apply(&mut self, element: &MigrationElement) -> Result<()> {
        // Past max_revision only sequencing is still checked.
        if self.skipping {
            return match element {
                MigrationElement::Revision(n) => self.check_sequence(*n),
                _ => Ok(()),
            };
        }

        match element {
            MigrationElement::Table(name) => {
                self.fail(format!("unexpected table marker {} inside a table run", name))
            }
            MigrationElement::AddColumn(spec) => self.add_column(spec),
            MigrationElement::ChangeColumn(change) => self.change_column(change),
            MigrationElement::DropColumn(name) => self.drop_column(name),
            MigrationElement::PrimaryKey(fields) => self.set_primary_key(fields),
            MigrationElement::DropPrimaryKey => self.drop_primary_key(),
            MigrationElement::NamedKey(key) => self.add_key(key),
            MigrationElement::DropNamedKey(name) => self.drop_key(name),
            MigrationElement::Revision(n) => self.next_revision(*n),
            MigrationElement::Sql(statement) => {
                self.emit([statement.clone()]);
                Ok(())
            }
        }
    }

    /// Close the last revision and decide what to do with the table.
    pub(crate) fn finish(mut self) -> Result<TablePlan> {
        self.close_batch()?;

        if self.columns.is_empty() {
            return self.fail("table declares no columns");
        }

        let declared = self.revision;
        let action = match self.stored {
            None => {
                let mut statements = vec![render_create_table(
                    &self.table,
                    &self.columns,
                    self.primary_key.as_deref(),
                )?];
                for key in &self.keys {
                    statements.push(key.render_create(&self.table)?);
                }
                statements.push(stamp_statement(&self.table, declared)?);

                let drop_statement = match self.dropped_revision {
                    Some(_) => Some(render_drop_table(&self.table)?),
                    None => None,
                };
                PlanAction::Create {
                    drop_statement,
                    batch: RevisionBatch {
                        revision: declared,
                        statements,
                    },
                }
            }
            Some(stored) if stored > declared => {
                warn!(
                    "Table {} is at revision {}, ahead of the declared revision {}; leaving it untouched",
                    self.table, stored, declared
                );
                PlanAction::Ahead
            }
            Some(_) if self.batches.is_empty() => PlanAction::UpToDate,
            Some(_) => PlanAction::Upgrade {
                batches: self.batches,
            },
        };

        Ok(TablePlan {
            stored_revision: self.stored.or(self.dropped_revision),
            declared_revision: declared,
            table: self.table,
            action,
        })
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    fn check_sequence(&mut self, n: u32) -> Result<()> {
        if n != self.last_seen + 1 {
            return self.fail(format!(
                "revision {} follows revision {}; revisions must increase by one",
                n, self.last_seen
            ));
        }
        self.last_seen = n;
        Ok(())
    }

    fn next_revision(&mut self, n: u32) -> Result<()> {
        self.check_sequence(n)?;
        self.close_batch()?;

        if self.max_revision.is_some_and(|max| n > max) {
            debug!(
                "Table {}: stopping at revision {} (max_revision)",
                self.table, self.revision
            );
            self.skipping = true;
            return Ok(());
        }

        self.revision = n;
        self.open_batch();
        Ok(())
    }

    /// Open a batch for the current revision when the live table needs it.
    fn open_batch(&mut self) {
        if let Some(stored) = self.stored {
            if self.revision > stored {
                self.open = Some(RevisionBatch {
                    revision: self.revision,
                    statements: Vec::new(),
                });
            }
        }
    }

    fn close_batch(&mut self) -> Result<()> {
        if let Some(mut batch) = self.open.take() {
            batch
                .statements
                .push(stamp_statement(&self.table, batch.revision)?);
            self.batches.push(batch);
        }
        Ok(())
    }

    /// Queue statements if a batch is open. Otherwise they only describe
    /// history the live table already has (or will get from `CREATE TABLE`).
    fn emit(&mut self, statements: impl IntoIterator<Item = String>) {
        if let Some(batch) = self.open.as_mut() {
            batch.statements.extend(statements);
        }
    }

    // =========================================================================
    // Columns
    // =========================================================================

    fn add_column(&mut self, spec: &ColumnSpec) -> Result<()> {
        if self.column(&spec.name).is_some() {
            return self.fail(format!("column '{}' is already declared", spec.name));
        }

        let existing = self.physical_names();
        if let Some(clash) = spec
            .physical_names()
            .into_iter()
            .find(|name| existing.contains(name))
        {
            return self.fail(format!(
                "column '{}' expands to '{}', which already exists",
                spec.name, clash
            ));
        }

        if let Some(pos) = self.dropped_columns.iter().position(|c| c.name == spec.name) {
            let dropped = &self.dropped_columns[pos];
            if dropped.field_type != spec.field_type {
                return self.fail(format!(
                    "column '{}' was dropped as {} and cannot be re-added as {}",
                    spec.name,
                    dropped.field_type.name(),
                    spec.field_type.name()
                ));
            }
            self.dropped_columns.remove(pos);
        }

        let statement = render_add_column(&self.table, spec)?;
        self.emit([statement]);
        self.columns.push(spec.clone());
        Ok(())
    }

    fn change_column(&mut self, change: &ChangeColumn) -> Result<()> {
        let source = change.source_name();
        let Some(pos) = self.column(source) else {
            return self.fail(format!("cannot change unknown column '{}'", source));
        };

        if change.is_rename() && self.column(&change.spec.name).is_some() {
            return self.fail(format!(
                "cannot rename '{}' to '{}': column already exists",
                source, change.spec.name
            ));
        }

        // A new shape can grow sub-columns that collide with other columns.
        let others: HashSet<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .flat_map(|(_, c)| c.physical_names())
            .collect();
        if let Some(clash) = change
            .spec
            .physical_names()
            .into_iter()
            .find(|name| others.contains(name))
        {
            return self.fail(format!(
                "cannot change '{}' to '{}': '{}' already exists",
                source, change.spec.name, clash
            ));
        }

        let prior = self.columns[pos].clone();
        let statements = change.render(&self.table, &prior)?;
        self.emit(statements);

        for (old, new) in change.renamed_physical(&prior) {
            self.rename_in_keys(&old, &new);
        }
        self.columns[pos] = change.spec.clone();
        self.forget_orphaned_keys();
        Ok(())
    }

    fn drop_column(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.column(name) else {
            return self.fail(format!("cannot drop unknown column '{}'", name));
        };

        let statement = render_drop_column(&self.table, &self.columns[pos])?;
        self.emit([statement]);
        let prior = self.columns.remove(pos);
        self.dropped_columns.push(prior);
        self.forget_orphaned_keys();
        Ok(())
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn physical_names(&self) -> HashSet<String> {
        self.columns.iter().flat_map(|c| c.physical_names()).collect()
    }

    // =========================================================================
    // Keys
    // =========================================================================

    fn set_primary_key(&mut self, fields: &[String]) -> Result<()> {
        self.check_key_fields("primary key", fields)?;

        let mut statements = Vec::new();
        if self.primary_key.is_some() {
            statements.push(render_drop_primary_key(&self.table)?);
        }
        statements.push(render_add_primary_key(&self.table, fields)?);
        self.emit(statements);
        self.primary_key = Some(fields.to_vec());
        Ok(())
    }

    fn drop_primary_key(&mut self) -> Result<()> {
        if self.primary_key.is_none() {
            return self.fail("cannot drop primary key: none is declared");
        }
        let statement = render_drop_primary_key(&self.table)?;
        self.emit([statement]);
        self.primary_key = None;
        Ok(())
    }

    fn add_key(&mut self, key: &NamedKey) -> Result<()> {
        self.check_key_fields(&format!("key '{}'", key.name), &key.fields)?;

        let mut statements = Vec::new();
        if let Some(pos) = self.keys.iter().position(|k| k.name == key.name) {
            statements.push(self.keys[pos].render_drop(&self.table)?);
            self.keys.remove(pos);
        }
        statements.push(key.render_create(&self.table)?);
        self.emit(statements);
        self.keys.push(key.clone());
        Ok(())
    }

    fn drop_key(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.keys.iter().position(|k| k.name == name) else {
            return self.fail(format!("cannot drop unknown key '{}'", name));
        };
        let statement = render_drop_index(&self.table, name)?;
        self.emit([statement]);
        self.keys.remove(pos);
        Ok(())
    }

    /// Key fields name physical columns, so composite columns must be
    /// listed by sub-column (`PositionX`, not `Position`).
    fn check_key_fields(&self, what: &str, fields: &[String]) -> Result<()> {
        if fields.is_empty() {
            return self.fail(format!("{} has no fields", what));
        }
        let physical = self.physical_names();
        let mut seen = HashSet::new();
        for field in fields {
            if !seen.insert(field.as_str()) {
                return self.fail(format!("{} lists '{}' twice", what, field));
            }
            if !physical.contains(field) {
                let hint = match self.column(field) {
                    Some(pos) if self.columns[pos].field_type.is_composite() => format!(
                        " (composite column; use one of {})",
                        self.columns[pos].physical_names().join(", ")
                    ),
                    _ => String::new(),
                };
                return self.fail(format!(
                    "{} references unknown column '{}'{}",
                    what, field, hint
                ));
            }
        }
        Ok(())
    }

    fn rename_in_keys(&mut self, old: &str, new: &str) {
        let fields = self
            .primary_key
            .iter_mut()
            .chain(self.keys.iter_mut().map(|k| &mut k.fields));
        for list in fields {
            for field in list.iter_mut().filter(|f| f.as_str() == old) {
                *field = new.to_string();
            }
        }
    }

    /// PostgreSQL drops constraints and indexes with their columns; follow suit.
    fn forget_orphaned_keys(&mut self) {
        let physical = self.physical_names();
        let covered = |fields: &[String]| fields.iter().all(|f| physical.contains(f));

        if let Some(pk) = &self.primary_key {
            if !covered(pk.as_slice()) {
                debug!("Table {}: primary key dropped with its columns", self.table);
                self.primary_key = None;
            }
        }
        let table = &self.table;
        self.keys.retain(|key| {
            let keep = covered(key.fields.as_slice());
            if !keep {
                debug!("Table {}: key {} dropped with its columns", table, key.name);
            }
            keep
        });
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(MigrateError::definition(self.table.name.as_str(), message))
    }
}
