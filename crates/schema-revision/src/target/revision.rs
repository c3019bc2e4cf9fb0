//! Per-table revision stamps.
//!
//! The current revision of a table is stored as its `COMMENT ON TABLE`
//! value, so it lives and dies with the table itself.

use crate::core::identifier::quote_literal;
use crate::error::{MigrateError, Result};
use crate::schema::TableRef;

/// Looks up a table's comment. No row means the table does not exist;
/// a row with a NULL comment means it exists but was never stamped.
pub const REVISION_QUERY: &str = "\
SELECT obj_description(c.oid, 'pg_class')
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')";

/// Statement recording `revision` on `table`.
pub fn stamp_statement(table: &TableRef, revision: u32) -> Result<String> {
    Ok(format!(
        "COMMENT ON TABLE {} IS {}",
        table.qualified()?,
        quote_literal(&revision.to_string())?
    ))
}

/// Interpret the comment of an existing table as its revision.
pub fn parse_stamp(table: &TableRef, comment: Option<&str>) -> Result<u32> {
    let Some(comment) = comment else {
        return Err(MigrateError::definition(
            table.name.as_str(),
            format!(
                "table {} exists but carries no revision stamp; it was not created by the migrator",
                table
            ),
        ));
    };

    comment.trim().parse::<u32>().map_err(|_| {
        MigrateError::definition(
            table.name.as_str(),
            format!(
                "table {} has comment {:?}, which is not a revision number",
                table, comment
            ),
        )
    })
}
