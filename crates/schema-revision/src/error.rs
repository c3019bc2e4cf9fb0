//! Error types for the schema migration library.

use thiserror::Error;

/// Boxed cause of a failed statement.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Exit code for configuration and definition errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection and pool errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for a failed statement outside a revision transaction.
pub const EXIT_EXECUTION_ERROR: u8 = 3;
/// Exit code for a revision transaction that was rolled back.
pub const EXIT_TRANSACTION_ERROR: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed element list: bad ordering, unknown columns, mismatched defaults.
    #[error("Definition error in table {table}: {message}")]
    Definition { table: String, message: String },

    /// A statement failed outside of any revision transaction.
    #[error("Statement failed: {source}\n  Statement: {statement}")]
    Execution {
        statement: String,
        #[source]
        source: BoxError,
    },

    /// A statement failed inside a revision transaction, which was rolled back.
    #[error("Migration of table {table} to revision {revision} rolled back: {source}\n  Statement: {statement}")]
    Transaction {
        table: String,
        revision: u32,
        statement: String,
        #[source]
        source: BoxError,
    },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Definition error for a table.
    pub fn definition(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Definition {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Whether the error came from a rolled back revision transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(self, MigrateError::Transaction { .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Definition { .. }
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::Target(_) | MigrateError::Pool { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Execution { .. } => EXIT_EXECUTION_ERROR,
            MigrateError::Transaction { .. } => EXIT_TRANSACTION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
