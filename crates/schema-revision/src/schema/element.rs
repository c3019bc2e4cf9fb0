//! Declarative migration elements.
//!
//! A schema definition is a flat list of [`MigrationElement`]s covering every
//! revision of every table:
//!
//! ```text
//! Table("regions")
//!   AddColumn(RegionID uuid)          -- revision 1
//!   PrimaryKey(RegionID)
//! Revision(2)
//!   AddColumn(Location grid vector)   -- revision 2
//! Table("parcels")
//!   ...
//! ```
//!
//! Elements know how to render their own DDL; deciding *whether* to run it
//! belongs to the planner.

use serde::{Deserialize, Serialize};

use crate::core::identifier::{qualify_pg, quote_list, quote_pg};
use crate::error::Result;

use super::types::{ColumnSpec, PhysicalColumn};

/// One instruction of a schema definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationElement {
    /// Start a new table.
    Table(String),

    /// Add a column at the current revision.
    AddColumn(ColumnSpec),

    /// Change type, constraints or name of a known column.
    ChangeColumn(ChangeColumn),

    /// Drop a known column and all of its physical sub-columns.
    DropColumn(String),

    /// Declare the primary key (physical column names).
    PrimaryKey(Vec<String>),

    /// Remove the primary key.
    DropPrimaryKey,

    /// Declare a secondary index.
    NamedKey(NamedKey),

    /// Remove a secondary index by name.
    DropNamedKey(String),

    /// Close the current revision and open the given one.
    Revision(u32),

    /// Raw statement, executed verbatim when upgrading an existing table.
    Sql(String),
}

impl MigrationElement {
    pub fn table(name: impl Into<String>) -> Self {
        MigrationElement::Table(name.into())
    }

    pub fn add_column(spec: ColumnSpec) -> Self {
        MigrationElement::AddColumn(spec)
    }

    /// Change a column in place, keeping its name.
    pub fn change_column(spec: ColumnSpec) -> Self {
        MigrationElement::ChangeColumn(ChangeColumn {
            spec,
            old_name: None,
        })
    }

    /// Change a column and rename it from `old_name` to `spec.name`.
    pub fn rename_column(old_name: impl Into<String>, spec: ColumnSpec) -> Self {
        MigrationElement::ChangeColumn(ChangeColumn {
            spec,
            old_name: Some(old_name.into()),
        })
    }

    pub fn drop_column(name: impl Into<String>) -> Self {
        MigrationElement::DropColumn(name.into())
    }

    pub fn primary_key<S: AsRef<str>>(fields: &[S]) -> Self {
        MigrationElement::PrimaryKey(fields.iter().map(|f| f.as_ref().to_string()).collect())
    }

    pub fn named_key<S: AsRef<str>>(name: impl Into<String>, fields: &[S]) -> Self {
        MigrationElement::NamedKey(NamedKey::new(name, fields, false))
    }

    pub fn unique_key<S: AsRef<str>>(name: impl Into<String>, fields: &[S]) -> Self {
        MigrationElement::NamedKey(NamedKey::new(name, fields, true))
    }

    pub fn drop_named_key(name: impl Into<String>) -> Self {
        MigrationElement::DropNamedKey(name.into())
    }

    pub fn revision(revision: u32) -> Self {
        MigrationElement::Revision(revision)
    }

    pub fn sql(statement: impl Into<String>) -> Self {
        MigrationElement::Sql(statement.into())
    }

    /// Short description for log messages.
    pub fn describe(&self) -> String {
        match self {
            MigrationElement::Table(name) => format!("table {}", name),
            MigrationElement::AddColumn(spec) => format!("add column {}", spec.name),
            MigrationElement::ChangeColumn(change) => match &change.old_name {
                Some(old) if old != &change.spec.name => {
                    format!("change column {} to {}", old, change.spec.name)
                }
                _ => format!("change column {}", change.spec.name),
            },
            MigrationElement::DropColumn(name) => format!("drop column {}", name),
            MigrationElement::PrimaryKey(fields) => format!("primary key ({})", fields.join(", ")),
            MigrationElement::DropPrimaryKey => "drop primary key".to_string(),
            MigrationElement::NamedKey(key) => format!("key {}", key.name),
            MigrationElement::DropNamedKey(name) => format!("drop key {}", name),
            MigrationElement::Revision(n) => format!("revision {}", n),
            MigrationElement::Sql(_) => "sql statement".to_string(),
        }
    }
}

/// Column change, optionally renaming the column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeColumn {
    #[serde(flatten)]
    pub spec: ColumnSpec,

    /// Previous logical name when the column is renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
}

impl ChangeColumn {
    /// Logical name the column is known under before this change.
    pub fn source_name(&self) -> &str {
        self.old_name.as_deref().unwrap_or(&self.spec.name)
    }

    /// Whether the change renames the column.
    pub fn is_rename(&self) -> bool {
        self.source_name() != self.spec.name
    }

    /// Render the statements turning `prior` into `self.spec`.
    ///
    /// Sub-columns are paired by suffix. When the composite shape changes,
    /// sub-columns only present before are dropped and sub-columns only
    /// present after are added.
    pub fn render(&self, table: &TableRef, prior: &ColumnSpec) -> Result<Vec<String>> {
        let qt = table.qualified()?;
        let old_cols = prior.physical_columns(&table.name)?;
        let new_cols = self.spec.physical_columns(&table.name)?;
        let mut statements = Vec::new();

        for old in &old_cols {
            if !new_cols.iter().any(|c| c.suffix == old.suffix) {
                statements.push(format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    qt,
                    quote_pg(&old.name)?
                ));
            }
        }

        for new in &new_cols {
            match old_cols.iter().find(|c| c.suffix == new.suffix) {
                Some(old) => statements.extend(alter_physical(&qt, old, new)?),
                None => statements.push(format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    qt,
                    new.definition()?
                )),
            }
        }

        Ok(statements)
    }

    /// Old to new physical name pairs for every renamed sub-column.
    pub fn renamed_physical(&self, prior: &ColumnSpec) -> Vec<(String, String)> {
        if !self.is_rename() {
            return Vec::new();
        }
        let new_type = self.spec.field_type;
        prior
            .field_type
            .suffixes()
            .iter()
            .filter(|suffix| new_type.suffixes().contains(suffix))
            .map(|suffix| {
                (
                    format!("{}{}", prior.name, suffix),
                    format!("{}{}", self.spec.name, suffix),
                )
            })
            .collect()
    }
}

/// Statements altering one existing physical column into its new shape.
fn alter_physical(qt: &str, old: &PhysicalColumn, new: &PhysicalColumn) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    let old_ident = quote_pg(&old.name)?;
    let ident = quote_pg(&new.name)?;

    if old.default.is_some() && old.default != new.default {
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            qt, old_ident
        ));
    }
    if !old.nullable && new.nullable {
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
            qt, old_ident
        ));
    }
    if old.name != new.name {
        statements.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            qt, old_ident, ident
        ));
    }
    if old.sql_type != new.sql_type {
        // An explicit cast to varchar(n) or char(n) truncates. Without USING,
        // the implicit assignment cast raises on values that no longer fit.
        if is_character(&old.sql_type) && is_character(&new.sql_type) {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                qt, ident, new.sql_type
            ));
        } else {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                qt, ident, new.sql_type, ident, new.sql_type
            ));
        }
    }
    if let Some(default) = new.default_clause()? {
        if old.nullable {
            statements.push(format!(
                "UPDATE {} SET {} = {} WHERE {} IS NULL",
                qt, ident, default, ident
            ));
        }
        if old.default != new.default {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                qt, ident, default
            ));
        }
    }
    if old.nullable && !new.nullable {
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            qt, ident
        ));
    }

    Ok(statements)
}

fn is_character(sql_type: &str) -> bool {
    sql_type == "text" || sql_type.starts_with("varchar(") || sql_type.starts_with("char(")
}

/// Secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedKey {
    /// Key name; the index is named `<table>_<name>`.
    pub name: String,

    /// Physical column names.
    pub fields: Vec<String>,

    #[serde(default, rename = "unique")]
    pub is_unique: bool,
}

impl NamedKey {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, fields: &[S], is_unique: bool) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            is_unique,
        }
    }

    pub fn render_create(&self, table: &TableRef) -> Result<String> {
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.is_unique { "UNIQUE " } else { "" },
            quote_pg(&table.index_name(&self.name))?,
            table.qualified()?,
            quote_list(&self.fields)?
        ))
    }

    pub fn render_drop(&self, table: &TableRef) -> Result<String> {
        render_drop_index(table, &self.name)
    }
}

/// Schema-qualified table reference used for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn qualified(&self) -> Result<String> {
        qualify_pg(&self.schema, &self.name)
    }

    /// Primary key constraint name, matching PostgreSQL's own default.
    pub fn pkey_name(&self) -> String {
        format!("{}_pkey", self.name)
    }

    /// Index names are schema-wide in PostgreSQL, so they carry the table name.
    pub fn index_name(&self, key: &str) -> String {
        format!("{}_{}", self.name, key)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

pub fn render_add_column(table: &TableRef, spec: &ColumnSpec) -> Result<String> {
    let clauses = spec
        .physical_columns(&table.name)?
        .iter()
        .map(|c| Ok(format!("ADD COLUMN {}", c.definition()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("ALTER TABLE {} {}", table.qualified()?, clauses.join(", ")))
}

pub fn render_drop_column(table: &TableRef, prior: &ColumnSpec) -> Result<String> {
    let clauses = prior
        .physical_names()
        .iter()
        .map(|n| Ok(format!("DROP COLUMN {}", quote_pg(n)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("ALTER TABLE {} {}", table.qualified()?, clauses.join(", ")))
}

pub fn render_add_primary_key(table: &TableRef, fields: &[String]) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
        table.qualified()?,
        quote_pg(&table.pkey_name())?,
        quote_list(fields)?
    ))
}

pub fn render_drop_primary_key(table: &TableRef) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} DROP CONSTRAINT {}",
        table.qualified()?,
        quote_pg(&table.pkey_name())?
    ))
}

pub fn render_drop_index(table: &TableRef, key: &str) -> Result<String> {
    Ok(format!(
        "DROP INDEX {}",
        qualify_pg(&table.schema, &table.index_name(key))?
    ))
}

/// Render a full `CREATE TABLE` for a set of accumulated columns.
pub fn render_create_table(
    table: &TableRef,
    columns: &[ColumnSpec],
    primary_key: Option<&[String]>,
) -> Result<String> {
    let mut defs = Vec::new();
    for spec in columns {
        for col in spec.physical_columns(&table.name)? {
            defs.push(col.definition()?);
        }
    }
    if let Some(fields) = primary_key {
        defs.push(format!("PRIMARY KEY ({})", quote_list(fields)?));
    }
    Ok(format!("CREATE TABLE {} ({})", table.qualified()?, defs.join(", ")))
}

pub fn render_drop_table(table: &TableRef) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", table.qualified()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{DefaultValue, FieldType};

    fn table() -> TableRef {
        TableRef::new("public", "prims")
    }

    #[test]
    fn test_add_column_scalar() {
        let spec = ColumnSpec::new("Name", FieldType::String).cardinality(64);
        assert_eq!(
            render_add_column(&table(), &spec).unwrap(),
            "ALTER TABLE \"public\".\"prims\" ADD COLUMN \"Name\" varchar(64)"
        );
    }

    #[test]
    fn test_add_column_composite() {
        let spec = ColumnSpec::new("Scale", FieldType::Vector3).default_value(DefaultValue::Vector3 {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        });
        assert_eq!(
            render_add_column(&table(), &spec).unwrap(),
            "ALTER TABLE \"public\".\"prims\" \
             ADD COLUMN \"ScaleX\" double precision NOT NULL DEFAULT '1', \
             ADD COLUMN \"ScaleY\" double precision NOT NULL DEFAULT '1', \
             ADD COLUMN \"ScaleZ\" double precision NOT NULL DEFAULT '1'"
        );
    }

    #[test]
    fn test_drop_column_composite_drops_every_sub_column() {
        let spec = ColumnSpec::new("Tint", FieldType::ColorRgba);
        assert_eq!(
            render_drop_column(&table(), &spec).unwrap(),
            "ALTER TABLE \"public\".\"prims\" DROP COLUMN \"TintRed\", DROP COLUMN \"TintGreen\", \
             DROP COLUMN \"TintBlue\", DROP COLUMN \"TintAlpha\""
        );
    }

    #[test]
    fn test_keys() {
        let t = table();
        assert_eq!(
            render_add_primary_key(&t, &["ID".to_string()]).unwrap(),
            "ALTER TABLE \"public\".\"prims\" ADD CONSTRAINT \"prims_pkey\" PRIMARY KEY (\"ID\")"
        );
        assert_eq!(
            render_drop_primary_key(&t).unwrap(),
            "ALTER TABLE \"public\".\"prims\" DROP CONSTRAINT \"prims_pkey\""
        );

        let key = NamedKey::new("owner", &["OwnerID", "Name"], true);
        assert_eq!(
            key.render_create(&t).unwrap(),
            "CREATE UNIQUE INDEX \"prims_owner\" ON \"public\".\"prims\" (\"OwnerID\", \"Name\")"
        );
        assert_eq!(
            key.render_drop(&t).unwrap(),
            "DROP INDEX \"public\".\"prims_owner\""
        );
    }

    #[test]
    fn test_create_table() {
        let columns = vec![
            ColumnSpec::new("id", FieldType::Uuid).not_null(),
            ColumnSpec::new("name", FieldType::String).cardinality(32),
            ColumnSpec::new("flag", FieldType::Bool).default_value(false),
        ];
        let pk = vec!["id".to_string()];
        assert_eq!(
            render_create_table(&TableRef::new("public", "t"), &columns, Some(&pk)).unwrap(),
            "CREATE TABLE \"public\".\"t\" (\"id\" uuid NOT NULL, \"name\" varchar(32), \
             \"flag\" boolean NOT NULL DEFAULT '0', PRIMARY KEY (\"id\"))"
        );
    }

    #[test]
    fn test_change_column_retype_and_constrain() {
        let prior = ColumnSpec::new("Count", FieldType::Int16);
        let change = ChangeColumn {
            spec: ColumnSpec::new("Count", FieldType::Int32).default_value(0),
            old_name: None,
        };
        assert_eq!(
            change.render(&table(), &prior).unwrap(),
            vec![
                "ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Count\" TYPE integer USING \"Count\"::integer",
                "UPDATE \"public\".\"prims\" SET \"Count\" = '0' WHERE \"Count\" IS NULL",
                "ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Count\" SET DEFAULT '0'",
                "ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Count\" SET NOT NULL",
            ]
        );
    }

    #[test]
    fn test_change_column_shrinking_string_keeps_assignment_cast() {
        let prior = ColumnSpec::new("Name", FieldType::String).cardinality(64);
        let change = ChangeColumn {
            spec: ColumnSpec::new("Name", FieldType::String).cardinality(32),
            old_name: None,
        };
        assert_eq!(
            change.render(&table(), &prior).unwrap(),
            vec!["ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Name\" TYPE varchar(32)"]
        );

        let fixed = ChangeColumn {
            spec: ColumnSpec::new("Name", FieldType::String).cardinality(8).fixed(),
            old_name: None,
        };
        assert_eq!(
            fixed.render(&table(), &prior).unwrap(),
            vec!["ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Name\" TYPE char(8)"]
        );
    }

    #[test]
    fn test_change_column_relax_constraints() {
        let prior = ColumnSpec::new("Flags", FieldType::Int32).default_value(0);
        let change = ChangeColumn {
            spec: ColumnSpec::new("Flags", FieldType::Int32),
            old_name: None,
        };
        assert_eq!(
            change.render(&table(), &prior).unwrap(),
            vec![
                "ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Flags\" DROP DEFAULT",
                "ALTER TABLE \"public\".\"prims\" ALTER COLUMN \"Flags\" DROP NOT NULL",
            ]
        );
    }

    #[test]
    fn test_change_column_rename_composite() {
        let prior = ColumnSpec::new("Pos", FieldType::Vector3);
        let change = ChangeColumn {
            spec: ColumnSpec::new("Position", FieldType::Vector3),
            old_name: Some("Pos".to_string()),
        };
        assert!(change.is_rename());
        assert_eq!(
            change.render(&table(), &prior).unwrap(),
            vec![
                "ALTER TABLE \"public\".\"prims\" RENAME COLUMN \"PosX\" TO \"PositionX\"",
                "ALTER TABLE \"public\".\"prims\" RENAME COLUMN \"PosY\" TO \"PositionY\"",
                "ALTER TABLE \"public\".\"prims\" RENAME COLUMN \"PosZ\" TO \"PositionZ\"",
            ]
        );
        assert_eq!(
            change.renamed_physical(&prior),
            vec![
                ("PosX".to_string(), "PositionX".to_string()),
                ("PosY".to_string(), "PositionY".to_string()),
                ("PosZ".to_string(), "PositionZ".to_string()),
            ]
        );
    }

    #[test]
    fn test_change_column_shape_change() {
        let prior = ColumnSpec::new("Rot", FieldType::Vector3);
        let change = ChangeColumn {
            spec: ColumnSpec::new("Rot", FieldType::Quaternion),
            old_name: None,
        };
        assert_eq!(
            change.render(&table(), &prior).unwrap(),
            vec!["ALTER TABLE \"public\".\"prims\" ADD COLUMN \"RotW\" double precision"]
        );

        let back = ChangeColumn {
            spec: ColumnSpec::new("Rot", FieldType::Vector3),
            old_name: None,
        };
        assert_eq!(
            back.render(&table(), &change.spec).unwrap(),
            vec!["ALTER TABLE \"public\".\"prims\" DROP COLUMN \"RotW\""]
        );
    }

    #[test]
    fn test_element_serde_shape() {
        let yaml = r#"
- table: regions
- add_column:
    name: RegionID
    type: uuid
    nullable: false
- add_column:
    name: Location
    type: grid_vector
- primary_key: [RegionID]
- revision: 2
- change_column:
    name: RegionName
    old_name: Name
    type: string
    cardinality: 64
- named_key:
    name: location
    fields: [LocationX, LocationY]
    unique: true
- drop_primary_key
- sql: UPDATE regions SET "Flags" = 0
"#;
        let elements = crate::schema::parse_definition(yaml).unwrap();
        assert_eq!(elements.len(), 9);
        assert_eq!(elements[0], MigrationElement::table("regions"));
        assert_eq!(elements[4], MigrationElement::revision(2));
        match &elements[5] {
            MigrationElement::ChangeColumn(change) => {
                assert_eq!(change.source_name(), "Name");
                assert_eq!(change.spec.cardinality, 64);
            }
            other => panic!("unexpected element {:?}", other),
        }
        assert_eq!(
            elements[6],
            MigrationElement::unique_key("location", &["LocationX", "LocationY"])
        );
        assert_eq!(elements[7], MigrationElement::DropPrimaryKey);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            MigrationElement::rename_column("Pos", ColumnSpec::new("Position", FieldType::Vector3))
                .describe(),
            "change column Pos to Position"
        );
        assert_eq!(MigrationElement::revision(3).describe(), "revision 3");
    }
}
