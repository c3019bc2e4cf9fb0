//! Semantic field types and their physical PostgreSQL columns.
//!
//! A [`ColumnSpec`] names a logical column and its [`FieldType`]. Scalar types
//! map to exactly one physical column; composite types (vectors, colors)
//! always expand into the same ordered set of suffixed sub-columns, so that
//! `Position` of type [`FieldType::Vector3`] becomes `PositionX`, `PositionY`
//! and `PositionZ`.
//!
//! This is the only place where semantic types turn into SQL type strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::identifier::{quote_literal, quote_pg};
use crate::error::{MigrateError, Result};

/// Length used for identity reference columns (`UserRef`, `GroupRef`).
const REFERENCE_LENGTH: u32 = 255;

/// Underlying integer width of an enum column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntWidth {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntWidth {
    /// Smallest signed PostgreSQL integer type holding every value of this width.
    ///
    /// PostgreSQL has no unsigned integers and no 1-byte integer, so unsigned
    /// widths move up one signed size.
    pub fn sql_type(self) -> &'static str {
        match self {
            IntWidth::I8 | IntWidth::U8 | IntWidth::I16 => "smallint",
            IntWidth::U16 | IntWidth::I32 => "integer",
            IntWidth::U32 | IntWidth::I64 => "bigint",
            IntWidth::U64 => "numeric(20)",
        }
    }

    fn range(self) -> (i128, i128) {
        match self {
            IntWidth::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntWidth::U8 => (0, u8::MAX as i128),
            IntWidth::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntWidth::U16 => (0, u16::MAX as i128),
            IntWidth::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntWidth::U32 => (0, u32::MAX as i128),
            IntWidth::I64 => (i64::MIN as i128, i64::MAX as i128),
            IntWidth::U64 => (0, u64::MAX as i128),
        }
    }
}

/// Domain-level field type, independent of its SQL representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    Float,
    Double,
    Bool,
    /// Seconds since the Unix epoch.
    Timestamp,
    Uuid,
    Bytes,
    /// Universal user identifier, stored as text.
    UserRef,
    /// Universal group identifier, stored as text.
    GroupRef,
    Enum(IntWidth),
    /// Integer grid coordinates.
    GridVector,
    Vector3,
    Quaternion,
    Vector4,
    ColorRgb,
    ColorRgba,
    EnvVector2,
    EnvVector4,
}

impl FieldType {
    /// Sub-column suffixes, in physical order. Scalars have a single empty suffix.
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            FieldType::GridVector | FieldType::EnvVector2 => &["X", "Y"],
            FieldType::Vector3 => &["X", "Y", "Z"],
            FieldType::Quaternion | FieldType::Vector4 => &["X", "Y", "Z", "W"],
            FieldType::ColorRgb => &["Red", "Green", "Blue"],
            FieldType::ColorRgba => &["Red", "Green", "Blue", "Alpha"],
            FieldType::EnvVector4 => &["Red", "Green", "Blue", "Value"],
            _ => &[""],
        }
    }

    /// Whether the type expands into more than one physical column.
    pub fn is_composite(self) -> bool {
        self.suffixes().len() > 1
    }

    /// Physical column names for a logical column of this type.
    pub fn physical_names(self, name: &str) -> Vec<String> {
        self.suffixes()
            .iter()
            .map(|suffix| format!("{}{}", name, suffix))
            .collect()
    }

    /// Human-readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
            FieldType::Uuid => "uuid",
            FieldType::Bytes => "bytes",
            FieldType::UserRef => "user reference",
            FieldType::GroupRef => "group reference",
            FieldType::Enum(_) => "enum",
            FieldType::GridVector => "grid vector",
            FieldType::Vector3 => "vector3",
            FieldType::Quaternion => "quaternion",
            FieldType::Vector4 => "vector4",
            FieldType::ColorRgb => "color",
            FieldType::ColorRgba => "color with alpha",
            FieldType::EnvVector2 => "environment vector2",
            FieldType::EnvVector4 => "environment vector4",
        }
    }

    /// SQL type shared by every physical column of this type.
    fn sql_type(self, spec: &ColumnSpec) -> String {
        match self {
            FieldType::String => {
                if spec.is_long || spec.cardinality == 0 {
                    "text".to_string()
                } else if spec.is_fixed {
                    format!("char({})", spec.cardinality)
                } else {
                    format!("varchar({})", spec.cardinality)
                }
            }
            FieldType::Int16 => "smallint".to_string(),
            FieldType::Int32 | FieldType::UInt16 => "integer".to_string(),
            FieldType::Int64 | FieldType::UInt32 | FieldType::Timestamp => "bigint".to_string(),
            FieldType::Float => "real".to_string(),
            FieldType::Double => "double precision".to_string(),
            FieldType::Bool => "boolean".to_string(),
            FieldType::Uuid => "uuid".to_string(),
            FieldType::Bytes => "bytea".to_string(),
            FieldType::UserRef | FieldType::GroupRef => format!("varchar({})", REFERENCE_LENGTH),
            FieldType::Enum(width) => width.sql_type().to_string(),
            FieldType::GridVector => "integer".to_string(),
            FieldType::Vector3 | FieldType::Quaternion | FieldType::Vector4 => {
                "double precision".to_string()
            }
            FieldType::ColorRgb
            | FieldType::ColorRgba
            | FieldType::EnvVector2
            | FieldType::EnvVector4 => "real".to_string(),
        }
    }
}

/// Default value of a column. Each variant matches one family of field types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    GridVector { x: i32, y: i32 },
    Vector3 { x: f64, y: f64, z: f64 },
    Vector4 { x: f64, y: f64, z: f64, w: f64 },
    Color { red: f32, green: f32, blue: f32 },
    ColorAlpha { red: f32, green: f32, blue: f32, alpha: f32 },
    EnvVector2 { x: f32, y: f32 },
    EnvVector4 { red: f32, green: f32, blue: f32, value: f32 },
}

impl DefaultValue {
    fn kind(&self) -> &'static str {
        match self {
            DefaultValue::Text(_) => "text",
            DefaultValue::Int(_) => "integer",
            DefaultValue::Float(_) => "float",
            DefaultValue::Bool(_) => "bool",
            DefaultValue::Timestamp(_) => "timestamp",
            DefaultValue::Uuid(_) => "uuid",
            DefaultValue::Bytes(_) => "bytes",
            DefaultValue::GridVector { .. } => "grid vector",
            DefaultValue::Vector3 { .. } => "vector3",
            DefaultValue::Vector4 { .. } => "vector4",
            DefaultValue::Color { .. } => "color",
            DefaultValue::ColorAlpha { .. } => "color with alpha",
            DefaultValue::EnvVector2 { .. } => "environment vector2",
            DefaultValue::EnvVector4 { .. } => "environment vector4",
        }
    }

    /// Unquoted literal text for each physical sub-column, in suffix order.
    fn components(&self) -> Vec<String> {
        match self {
            DefaultValue::Text(s) => vec![s.clone()],
            DefaultValue::Int(v) => vec![v.to_string()],
            DefaultValue::Float(v) => vec![v.to_string()],
            DefaultValue::Bool(b) => vec![if *b { "1" } else { "0" }.to_string()],
            DefaultValue::Timestamp(ts) => vec![ts.timestamp().to_string()],
            DefaultValue::Uuid(u) => vec![u.to_string()],
            DefaultValue::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                vec![format!("\\x{}", hex)]
            }
            DefaultValue::GridVector { x, y } => vec![x.to_string(), y.to_string()],
            DefaultValue::Vector3 { x, y, z } => {
                vec![x.to_string(), y.to_string(), z.to_string()]
            }
            DefaultValue::Vector4 { x, y, z, w } => {
                vec![x.to_string(), y.to_string(), z.to_string(), w.to_string()]
            }
            DefaultValue::Color { red, green, blue } => {
                vec![red.to_string(), green.to_string(), blue.to_string()]
            }
            DefaultValue::ColorAlpha {
                red,
                green,
                blue,
                alpha,
            } => vec![
                red.to_string(),
                green.to_string(),
                blue.to_string(),
                alpha.to_string(),
            ],
            DefaultValue::EnvVector2 { x, y } => vec![x.to_string(), y.to_string()],
            DefaultValue::EnvVector4 {
                red,
                green,
                blue,
                value,
            } => vec![
                red.to_string(),
                green.to_string(),
                blue.to_string(),
                value.to_string(),
            ],
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            DefaultValue::Float(v) => v.is_finite(),
            DefaultValue::Vector3 { x, y, z } => x.is_finite() && y.is_finite() && z.is_finite(),
            DefaultValue::Vector4 { x, y, z, w } => {
                x.is_finite() && y.is_finite() && z.is_finite() && w.is_finite()
            }
            DefaultValue::Color { red, green, blue } => {
                red.is_finite() && green.is_finite() && blue.is_finite()
            }
            DefaultValue::ColorAlpha {
                red,
                green,
                blue,
                alpha,
            } => red.is_finite() && green.is_finite() && blue.is_finite() && alpha.is_finite(),
            DefaultValue::EnvVector2 { x, y } => x.is_finite() && y.is_finite(),
            DefaultValue::EnvVector4 {
                red,
                green,
                blue,
                value,
            } => red.is_finite() && green.is_finite() && blue.is_finite() && value.is_finite(),
            _ => true,
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        DefaultValue::Text(v.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(v: String) -> Self {
        DefaultValue::Text(v)
    }
}

impl From<i64> for DefaultValue {
    fn from(v: i64) -> Self {
        DefaultValue::Int(v)
    }
}

impl From<i32> for DefaultValue {
    fn from(v: i32) -> Self {
        DefaultValue::Int(v as i64)
    }
}

impl From<f64> for DefaultValue {
    fn from(v: f64) -> Self {
        DefaultValue::Float(v)
    }
}

impl From<bool> for DefaultValue {
    fn from(v: bool) -> Self {
        DefaultValue::Bool(v)
    }
}

impl From<Uuid> for DefaultValue {
    fn from(v: Uuid) -> Self {
        DefaultValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for DefaultValue {
    fn from(v: DateTime<Utc>) -> Self {
        DefaultValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for DefaultValue {
    fn from(v: Vec<u8>) -> Self {
        DefaultValue::Bytes(v)
    }
}

/// Logical column declaration shared by add and change elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawColumnSpec", into = "RawColumnSpec")]
pub struct ColumnSpec {
    /// Logical column name; composite types append suffixes to it.
    pub name: String,

    /// Semantic type.
    pub field_type: FieldType,

    /// Character length for strings (0 = unbounded).
    pub cardinality: u32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Unbounded text regardless of cardinality.
    pub is_long: bool,

    /// Fixed-length `char(n)` instead of `varchar(n)`.
    pub is_fixed: bool,

    /// Default value; only rendered for non-nullable columns.
    pub default: Option<DefaultValue>,
}

impl ColumnSpec {
    /// Declare a nullable column without a default.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            cardinality: 0,
            is_nullable: true,
            is_long: false,
            is_fixed: false,
            default: None,
        }
    }

    pub fn cardinality(mut self, cardinality: u32) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn long(mut self) -> Self {
        self.is_long = true;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_fixed = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    /// Set a default value. A column with a default is NOT NULL unless
    /// [`nullable`](Self::nullable) is called afterwards.
    pub fn default_value(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self.is_nullable = false;
        self
    }

    /// Check flags and default against the field type.
    ///
    /// `table` is only used for error messages.
    pub fn validate(&self, table: &str) -> Result<()> {
        let fail = |message: String| Err(MigrateError::definition(table, message));

        if self.name.is_empty() {
            return fail("column name cannot be empty".to_string());
        }

        if self.field_type != FieldType::String {
            if self.cardinality != 0 || self.is_long || self.is_fixed {
                return fail(format!(
                    "column '{}': cardinality, long and fixed only apply to string columns, not {}",
                    self.name,
                    self.field_type.name()
                ));
            }
        } else if self.is_fixed && (self.cardinality == 0 || self.is_long) {
            return fail(format!(
                "column '{}': a fixed-length string needs a cardinality and cannot be long",
                self.name
            ));
        }

        if let Some(default) = &self.default {
            if !default_matches(self.field_type, default) {
                return fail(format!(
                    "column '{}': default of type {} does not match field type {}",
                    self.name,
                    default.kind(),
                    self.field_type.name()
                ));
            }
            if !default.is_finite() {
                return fail(format!(
                    "column '{}': default contains a non-finite float",
                    self.name
                ));
            }
            if let (FieldType::String, DefaultValue::Text(text)) = (self.field_type, default) {
                if self.cardinality > 0
                    && !self.is_long
                    && text.chars().count() > self.cardinality as usize
                {
                    return fail(format!(
                        "column '{}': default is longer than cardinality {}",
                        self.name, self.cardinality
                    ));
                }
            }
            if let DefaultValue::Int(v) = default {
                if let Some((min, max)) = int_range(self.field_type) {
                    if (*v as i128) < min || (*v as i128) > max {
                        return fail(format!(
                            "column '{}': default {} is out of range for {}",
                            self.name,
                            v,
                            self.field_type.name()
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Physical column names, in order.
    pub fn physical_names(&self) -> Vec<String> {
        self.field_type.physical_names(&self.name)
    }

    /// Expand into physical columns, validating first.
    pub fn physical_columns(&self, table: &str) -> Result<Vec<PhysicalColumn>> {
        self.validate(table)?;

        let sql_type = self.field_type.sql_type(self);
        let defaults = match (&self.default, self.is_nullable) {
            (Some(default), false) => Some(default.components()),
            _ => None,
        };

        Ok(self
            .field_type
            .suffixes()
            .iter()
            .enumerate()
            .map(|(i, &suffix)| PhysicalColumn {
                name: format!("{}{}", self.name, suffix),
                suffix,
                sql_type: sql_type.clone(),
                nullable: self.is_nullable,
                default: defaults.as_ref().and_then(|d| d.get(i).cloned()),
            })
            .collect())
    }
}

fn default_matches(field_type: FieldType, default: &DefaultValue) -> bool {
    matches!(
        (field_type, default),
        (FieldType::String, DefaultValue::Text(_))
            | (FieldType::Int16, DefaultValue::Int(_))
            | (FieldType::Int32, DefaultValue::Int(_))
            | (FieldType::Int64, DefaultValue::Int(_))
            | (FieldType::UInt16, DefaultValue::Int(_))
            | (FieldType::UInt32, DefaultValue::Int(_))
            | (FieldType::Enum(_), DefaultValue::Int(_))
            | (FieldType::Float, DefaultValue::Float(_))
            | (FieldType::Double, DefaultValue::Float(_))
            | (FieldType::Bool, DefaultValue::Bool(_))
            | (FieldType::Timestamp, DefaultValue::Timestamp(_))
            | (FieldType::Uuid, DefaultValue::Uuid(_))
            | (FieldType::Bytes, DefaultValue::Bytes(_))
            | (FieldType::UserRef, DefaultValue::Text(_))
            | (FieldType::UserRef, DefaultValue::Uuid(_))
            | (FieldType::GroupRef, DefaultValue::Text(_))
            | (FieldType::GroupRef, DefaultValue::Uuid(_))
            | (FieldType::GridVector, DefaultValue::GridVector { .. })
            | (FieldType::Vector3, DefaultValue::Vector3 { .. })
            | (FieldType::Quaternion, DefaultValue::Vector4 { .. })
            | (FieldType::Vector4, DefaultValue::Vector4 { .. })
            | (FieldType::ColorRgb, DefaultValue::Color { .. })
            | (FieldType::ColorRgba, DefaultValue::ColorAlpha { .. })
            | (FieldType::EnvVector2, DefaultValue::EnvVector2 { .. })
            | (FieldType::EnvVector4, DefaultValue::EnvVector4 { .. })
    )
}

fn int_range(field_type: FieldType) -> Option<(i128, i128)> {
    match field_type {
        FieldType::Int16 => Some(IntWidth::I16.range()),
        FieldType::Int32 => Some(IntWidth::I32.range()),
        FieldType::Int64 => Some(IntWidth::I64.range()),
        FieldType::UInt16 => Some(IntWidth::U16.range()),
        FieldType::UInt32 => Some(IntWidth::U32.range()),
        FieldType::Enum(width) => Some(width.range()),
        _ => None,
    }
}

/// One actual SQL column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalColumn {
    /// Column name (logical name plus suffix).
    pub name: String,

    /// Suffix this column was generated with ("" for scalars).
    pub suffix: &'static str,

    /// SQL type declaration, e.g. `varchar(32)`.
    pub sql_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Unquoted default literal.
    pub default: Option<String>,
}

impl PhysicalColumn {
    /// Quoted default literal, if any.
    pub fn default_clause(&self) -> Result<Option<String>> {
        self.default.as_deref().map(quote_literal).transpose()
    }

    /// Column definition as used by `CREATE TABLE` and `ADD COLUMN`.
    pub fn definition(&self) -> Result<String> {
        let mut def = format!("{} {}", quote_pg(&self.name)?, self.sql_type);
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_clause()? {
            def.push_str(" DEFAULT ");
            def.push_str(&default);
        }
        Ok(def)
    }
}

/// Serde shape of [`ColumnSpec`]: nullability defaults to "no default given".
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawColumnSpec {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default, skip_serializing_if = "is_zero")]
    cardinality: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    long: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<DefaultValue>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl From<RawColumnSpec> for ColumnSpec {
    fn from(raw: RawColumnSpec) -> Self {
        let is_nullable = raw.nullable.unwrap_or(raw.default.is_none());
        Self {
            name: raw.name,
            field_type: raw.field_type,
            cardinality: raw.cardinality,
            is_nullable,
            is_long: raw.long,
            is_fixed: raw.fixed,
            default: raw.default,
        }
    }
}

impl From<ColumnSpec> for RawColumnSpec {
    fn from(spec: ColumnSpec) -> Self {
        Self {
            name: spec.name,
            field_type: spec.field_type,
            cardinality: spec.cardinality,
            nullable: Some(spec.is_nullable),
            long: spec.is_long,
            fixed: spec.is_fixed,
            default: spec.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn single(spec: ColumnSpec) -> PhysicalColumn {
        let mut cols = spec.physical_columns("t").unwrap();
        assert_eq!(cols.len(), 1);
        cols.remove(0)
    }

    #[test]
    fn test_string_types() {
        assert_eq!(single(ColumnSpec::new("n", FieldType::String)).sql_type, "text");
        assert_eq!(
            single(ColumnSpec::new("n", FieldType::String).cardinality(32)).sql_type,
            "varchar(32)"
        );
        assert_eq!(
            single(ColumnSpec::new("n", FieldType::String).cardinality(2).fixed()).sql_type,
            "char(2)"
        );
        assert_eq!(
            single(ColumnSpec::new("n", FieldType::String).cardinality(255).long()).sql_type,
            "text"
        );
    }

    #[test]
    fn test_scalar_types() {
        let cases = [
            (FieldType::Int16, "smallint"),
            (FieldType::Int32, "integer"),
            (FieldType::Int64, "bigint"),
            (FieldType::UInt16, "integer"),
            (FieldType::UInt32, "bigint"),
            (FieldType::Float, "real"),
            (FieldType::Double, "double precision"),
            (FieldType::Bool, "boolean"),
            (FieldType::Timestamp, "bigint"),
            (FieldType::Uuid, "uuid"),
            (FieldType::Bytes, "bytea"),
            (FieldType::UserRef, "varchar(255)"),
        ];
        for (field_type, expected) in cases {
            let col = single(ColumnSpec::new("c", field_type));
            assert_eq!(col.sql_type, expected, "{:?}", field_type);
            assert_eq!(col.name, "c");
        }
    }

    #[test]
    fn test_enum_widths() {
        assert_eq!(IntWidth::I8.sql_type(), "smallint");
        assert_eq!(IntWidth::U8.sql_type(), "smallint");
        assert_eq!(IntWidth::I16.sql_type(), "smallint");
        assert_eq!(IntWidth::U16.sql_type(), "integer");
        assert_eq!(IntWidth::I32.sql_type(), "integer");
        assert_eq!(IntWidth::U32.sql_type(), "bigint");
        assert_eq!(IntWidth::I64.sql_type(), "bigint");
        assert_eq!(IntWidth::U64.sql_type(), "numeric(20)");
    }

    #[test]
    fn test_composite_expansion() {
        let cases: [(FieldType, &[&str]); 8] = [
            (FieldType::GridVector, &["PosX", "PosY"]),
            (FieldType::Vector3, &["PosX", "PosY", "PosZ"]),
            (FieldType::Quaternion, &["PosX", "PosY", "PosZ", "PosW"]),
            (FieldType::Vector4, &["PosX", "PosY", "PosZ", "PosW"]),
            (FieldType::ColorRgb, &["PosRed", "PosGreen", "PosBlue"]),
            (
                FieldType::ColorRgba,
                &["PosRed", "PosGreen", "PosBlue", "PosAlpha"],
            ),
            (FieldType::EnvVector2, &["PosX", "PosY"]),
            (
                FieldType::EnvVector4,
                &["PosRed", "PosGreen", "PosBlue", "PosValue"],
            ),
        ];
        for (field_type, expected) in cases {
            let cols = ColumnSpec::new("Pos", field_type).physical_columns("t").unwrap();
            let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, expected, "{:?}", field_type);
            assert!(field_type.is_composite());
        }
        assert_eq!(
            ColumnSpec::new("Pos", FieldType::GridVector).physical_columns("t").unwrap()[0]
                .sql_type,
            "integer"
        );
        assert_eq!(
            ColumnSpec::new("Pos", FieldType::Vector3).physical_columns("t").unwrap()[0].sql_type,
            "double precision"
        );
        assert_eq!(
            ColumnSpec::new("Tint", FieldType::ColorRgb).physical_columns("t").unwrap()[0]
                .sql_type,
            "real"
        );
    }

    #[test]
    fn test_composite_default_per_component() {
        let spec = ColumnSpec::new("Pos", FieldType::Vector3).default_value(DefaultValue::Vector3 {
            x: 128.0,
            y: 64.5,
            z: 0.0,
        });
        let defs: Vec<String> = spec
            .physical_columns("t")
            .unwrap()
            .iter()
            .map(|c| c.definition().unwrap())
            .collect();
        assert_eq!(
            defs,
            vec![
                "\"PosX\" double precision NOT NULL DEFAULT '128'",
                "\"PosY\" double precision NOT NULL DEFAULT '64.5'",
                "\"PosZ\" double precision NOT NULL DEFAULT '0'",
            ]
        );
    }

    #[test]
    fn test_bool_and_timestamp_defaults() {
        let flag = single(ColumnSpec::new("flag", FieldType::Bool).default_value(false));
        assert_eq!(flag.definition().unwrap(), "\"flag\" boolean NOT NULL DEFAULT '0'");

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let created = single(ColumnSpec::new("created", FieldType::Timestamp).default_value(ts));
        assert_eq!(created.default.as_deref(), Some("1704067200"));
    }

    #[test]
    fn test_string_default_is_escaped() {
        let col = single(
            ColumnSpec::new("Name", FieldType::String)
                .cardinality(64)
                .default_value("O'Brien"),
        );
        assert_eq!(
            col.definition().unwrap(),
            "\"Name\" varchar(64) NOT NULL DEFAULT 'O''Brien'"
        );
    }

    #[test]
    fn test_nullable_column_ignores_default() {
        let col = single(
            ColumnSpec::new("Count", FieldType::Int32)
                .default_value(5)
                .nullable(),
        );
        assert_eq!(col.definition().unwrap(), "\"Count\" integer");
    }

    #[test]
    fn test_bytes_default_hex() {
        let col = single(ColumnSpec::new("Data", FieldType::Bytes).default_value(vec![0x01u8, 0xab]));
        assert_eq!(
            col.definition().unwrap(),
            "\"Data\" bytea NOT NULL DEFAULT '\\x01ab'"
        );
    }

    #[test]
    fn test_mismatched_default_rejected() {
        let err = ColumnSpec::new("flag", FieldType::Bool)
            .default_value(1)
            .physical_columns("t")
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));

        let err = ColumnSpec::new("Pos", FieldType::Vector3)
            .default_value(DefaultValue::Vector4 {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 1.0,
            })
            .validate("t")
            .unwrap_err();
        assert!(matches!(err, MigrateError::Definition { .. }));
    }

    #[test]
    fn test_reference_accepts_raw_uuid_default() {
        let spec = ColumnSpec::new("Owner", FieldType::UserRef).default_value(Uuid::nil());
        let col = single(spec);
        assert_eq!(
            col.default.as_deref(),
            Some("00000000-0000-0000-0000-000000000000")
        );

        let err = ColumnSpec::new("Owner", FieldType::Uuid)
            .default_value("00000000-0000-0000-0000-000000000000")
            .validate("t");
        assert!(err.is_err());
    }

    #[test]
    fn test_int_default_range() {
        assert!(ColumnSpec::new("c", FieldType::Int16)
            .default_value(40_000)
            .validate("t")
            .is_err());
        assert!(ColumnSpec::new("c", FieldType::Enum(IntWidth::U8))
            .default_value(-1)
            .validate("t")
            .is_err());
        assert!(ColumnSpec::new("c", FieldType::Enum(IntWidth::U8))
            .default_value(255)
            .validate("t")
            .is_ok());
    }

    #[test]
    fn test_string_flags_rejected_on_other_types() {
        let err = ColumnSpec::new("id", FieldType::Uuid)
            .cardinality(36)
            .validate("t")
            .unwrap_err();
        assert!(err.to_string().contains("only apply to string"));

        assert!(ColumnSpec::new("code", FieldType::String)
            .fixed()
            .validate("t")
            .is_err());
    }

    #[test]
    fn test_non_finite_default_rejected() {
        assert!(ColumnSpec::new("f", FieldType::Double)
            .default_value(f64::NAN)
            .validate("t")
            .is_err());
    }

    #[test]
    fn test_serde_nullability_follows_default() {
        let spec: ColumnSpec =
            crate::schema::from_yaml("name: flag\ntype: bool\ndefault:\n  bool: true\n").unwrap();
        assert!(!spec.is_nullable);
        assert_eq!(spec.default, Some(DefaultValue::Bool(true)));

        let spec: ColumnSpec = crate::schema::from_yaml("name: note\ntype: string\n").unwrap();
        assert!(spec.is_nullable);

        let spec: ColumnSpec =
            crate::schema::from_yaml("name: kind\ntype:\n  enum: u8\nnullable: false\n").unwrap();
        assert_eq!(spec.field_type, FieldType::Enum(IntWidth::U8));
        assert!(!spec.is_nullable);
    }
}
