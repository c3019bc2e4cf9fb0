//! Schema definitions: column types, migration elements and definition files.

pub mod element;
pub mod types;

pub use element::{ChangeColumn, MigrationElement, NamedKey, TableRef};
pub use types::{ColumnSpec, DefaultValue, FieldType, IntWidth, PhysicalColumn};

use crate::error::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load an element list from a YAML definition file.
pub fn load_definition<P: AsRef<Path>>(path: P) -> Result<Vec<MigrationElement>> {
    let content = std::fs::read_to_string(path)?;
    parse_definition(&content)
}

/// Parse an element list from YAML.
///
/// Only the shape is checked here. Ordering rules and column validation are
/// enforced when the definition is planned.
pub fn parse_definition(yaml: &str) -> Result<Vec<MigrationElement>> {
    from_yaml(yaml)
}

/// Deserialize YAML that writes enum variants as `{ variant: value }` maps.
///
/// serde_yaml only reads `!variant` tags natively, so every nested enum
/// (elements, field types, defaults) goes through the singleton map adapter.
pub(crate) fn from_yaml<T: DeserializeOwned>(yaml: &str) -> Result<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml);
    Ok(serde_yaml::with::singleton_map_recursive::deserialize(
        deserializer,
    )?)
}

/// Names of the tables a definition declares, in order.
pub fn table_names(elements: &[MigrationElement]) -> Vec<&str> {
    elements
        .iter()
        .filter_map(|e| match e {
            MigrationElement::Table(name) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}
