//! PostgreSQL schema target.
//!
//! Uses deadpool-postgres for pooling. Revision batches run inside
//! serializable transactions.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, IsolationLevel};
use tracing::{debug, error, info, warn};

use super::revision::{parse_stamp, REVISION_QUERY};
use super::tls::SslMode;
use super::{RevisionBatch, SchemaTarget};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use crate::schema::element::render_drop_table;
use crate::schema::TableRef;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL database holding migrated tables.
pub struct PgSchemaTarget {
    pool: Pool,
}

impl PgSchemaTarget {
    /// Create a pool from configuration and test the connection.
    pub async fn connect(config: &DatabaseConfig, pool_size: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("schema-revision");
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let mgr = match ssl_mode.connector()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(pool_size)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?;

        let target = Self::from_pool(pool);
        target.health_check().await?;

        info!("Connected to PostgreSQL: {}", config.display_target());
        Ok(target)
    }

    /// Use an existing pool, e.g. one shared with the service's data access.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }
}

#[async_trait]
impl SchemaTarget for PgSchemaTarget {
    async fn table_revision(&self, table: &TableRef) -> Result<Option<u32>> {
        let client = self.client("reading table revision").await?;
        let row = client
            .query_opt(REVISION_QUERY, &[&table.schema, &table.name])
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let comment: Option<String> = row.get(0);
                parse_stamp(table, comment.as_deref()).map(Some)
            }
        }
    }

    async fn apply_batch(&self, table: &TableRef, batch: &RevisionBatch) -> Result<()> {
        let mut client = self.client("applying revision batch").await?;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await?;

        for statement in &batch.statements {
            debug!("{}: {}", table, statement);
            if let Err(e) = tx.batch_execute(statement).await {
                error!(
                    "Migration of table {} to revision {} failed: {}\n  Statement: {}",
                    table, batch.revision, e, statement
                );
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback of table {} failed: {}", table, rollback);
                }
                return Err(MigrateError::Transaction {
                    table: table.to_string(),
                    revision: batch.revision,
                    statement: statement.clone(),
                    source: Box::new(e),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        let client = self.client("dropping table").await?;
        let statement = render_drop_table(table)?;
        if let Err(e) = client.batch_execute(&statement).await {
            error!("Dropping table {} failed: {}\n  Statement: {}", table, e, statement);
            return Err(MigrateError::Execution {
                statement,
                source: Box::new(e),
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
