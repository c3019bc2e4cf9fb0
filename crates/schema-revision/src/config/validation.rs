//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};
use crate::target::tls::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;
    if db.host.is_empty() {
        return Err(MigrateError::Config("database.host is required".into()));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config("database.database is required".into()));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config("database.user is required".into()));
    }
    validate_identifier(&db.schema)
        .map_err(|e| MigrateError::Config(format!("database.schema is invalid: {}", e)))?;
    SslMode::parse(&db.ssl_mode)?;

    if config.migration.pool_size == 0 {
        return Err(MigrateError::Config(
            "migration.pool_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.max_revision {
        return Err(MigrateError::Config(
            "migration.max_revision must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, MigrationOptions};

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "grid".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationOptions::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.database.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_schema_name() {
        let mut config = valid_config();
        config.database.schema = "bad\0schema".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("database.schema"));
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.database.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.migration.pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_max_revision() {
        let mut config = valid_config();
        config.migration.max_revision = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.database.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.database);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
