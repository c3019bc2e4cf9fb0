//! Low-level building blocks shared by the schema and target modules.
//!
//! - [`identifier`]: identifier validation and quoting for generated DDL

pub mod identifier;
