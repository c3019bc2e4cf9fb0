//! # schema-revision
//!
//! Revision-based, declarative schema migrations for PostgreSQL.
//!
//! A service describes its tables as a flat list of [`MigrationElement`]s:
//! columns, keys and raw statements, separated by revision markers. On
//! startup the list is compared with the revision stamped on each live table
//! and only the missing revisions are applied, one transaction each:
//!
//! - **Fresh install**: an absent table is created at its final revision
//!   with a single `CREATE TABLE`
//! - **Upgrade**: an older table is altered in place, revision by revision
//! - **Composite columns**: vectors and colors expand into suffixed
//!   sub-columns (`PositionX`, `PositionY`, `PositionZ`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use schema_revision::{ColumnSpec, Config, FieldType, MigrationElement, Migrator, PgSchemaTarget};
//!
//! #[tokio::main]
//! async fn main() -> schema_revision::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let target = PgSchemaTarget::connect(&config.database, config.migration.pool_size).await?;
//!
//!     let elements = vec![
//!         MigrationElement::table("regions"),
//!         MigrationElement::add_column(ColumnSpec::new("RegionID", FieldType::Uuid).not_null()),
//!         MigrationElement::primary_key(&["RegionID"]),
//!         MigrationElement::revision(2),
//!         MigrationElement::add_column(ColumnSpec::new("Location", FieldType::GridVector)),
//!     ];
//!
//!     let report = Migrator::new(Arc::new(target), config.database.schema.clone())
//!         .with_options(config.migration.clone())
//!         .migrate(&elements)
//!         .await?;
//!     println!("Applied {} revisions", report.batches_applied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod migrator;
pub mod schema;
pub mod target;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationOptions};
pub use error::{MigrateError, Result};
pub use migrator::{MigrationPlan, MigrationReport, Migrator, PlanAction, TablePlan, TableStatus};
pub use schema::{
    load_definition, parse_definition, ColumnSpec, DefaultValue, FieldType, IntWidth,
    MigrationElement, NamedKey, TableRef,
};
pub use target::{MemoryTarget, PgSchemaTarget, RevisionBatch, SchemaTarget};
