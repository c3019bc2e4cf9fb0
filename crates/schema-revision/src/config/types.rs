//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database whose tables are migrated.
    pub database: DatabaseConfig,

    /// Migration behavior.
    #[serde(default)]
    pub migration: MigrationOptions,
}

/// PostgreSQL connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema holding the migrated tables (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Drop every table before migrating it. Intended for test fixtures.
    #[serde(default)]
    pub delete_before_migrating: bool,

    /// Stop processing each table after this revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_revision: Option<u32>,

    /// Connection pool size (default: 2).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            delete_before_migrating: false,
            max_revision: None,
            pool_size: default_pool_size(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_pool_size() -> usize {
    2
}
