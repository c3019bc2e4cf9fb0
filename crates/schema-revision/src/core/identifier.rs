//! Centralized identifier validation and quoting for generated DDL.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed as
//! parameters in prepared statements - only data values can be parameterized.
//! Every identifier and literal that ends up in generated DDL goes through this
//! module:
//!
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Apply PostgreSQL double-quote quoting
//! 3. Escape special characters within the quotes

use crate::error::{MigrateError, Result};

/// Maximum identifier length. PostgreSQL silently truncates anything longer
/// than `NAMEDATALEN - 1` bytes, which would make derived index names collide.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `MigrateError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
/// Validates the identifier before quoting.
///
/// # Examples
///
/// ```
/// use schema_revision::core::identifier::quote_pg;
///
/// assert_eq!(quote_pg("users").unwrap(), "\"users\"");
/// assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
///
/// Returns `schema.table` with proper quoting.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a string as a PostgreSQL literal.
///
/// Single quotes are doubled. Backslashes are left alone since
/// `standard_conforming_strings` is on by default; null bytes cannot be
/// stored in text and are rejected.
pub fn quote_literal(value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Literal contains null byte: {:?}",
            value
        )));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Quote a comma separated list of identifiers.
pub fn quote_list(names: &[String]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_pg(n))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("PositionX").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_validate_identifier_accepts_max_length() {
        let max_name = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max_name).is_ok());
    }

    // =========================================================================
    // Quoting tests
    // =========================================================================

    #[test]
    fn test_quote_pg_normal() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("Table123").unwrap(), "\"Table123\"");
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
        assert_eq!(quote_pg("a\"b\"c").unwrap(), "\"a\"\"b\"\"c\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let result = quote_pg("Robert'); DROP TABLE Students;--");
        assert_eq!(result.unwrap(), "\"Robert'); DROP TABLE Students;--\"");
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(
            qualify_pg("public", "users").unwrap(),
            "\"public\".\"users\""
        );
        assert!(qualify_pg("", "users").is_err());
        assert!(qualify_pg("public", "table\0name").is_err());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("3").unwrap(), "'3'");
        assert_eq!(quote_literal("O'Brien").unwrap(), "'O''Brien'");
        assert_eq!(quote_literal("").unwrap(), "''");
        assert!(quote_literal("a\0b").is_err());
    }

    #[test]
    fn test_quote_list() {
        let names = vec!["RegionID".to_string(), "ParcelID".to_string()];
        assert_eq!(quote_list(&names).unwrap(), "\"RegionID\", \"ParcelID\"");
    }
}
