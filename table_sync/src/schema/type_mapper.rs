//! Bidirectional mapping between canonical field types and dialect column types

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::dialect::Dialect;
use crate::error::{Error, Result};
use crate::schema::types::{Field, FieldType, TypeParams};
use crate::utils::naming::enum_type_name;

/// `base(args) unsigned zerofill`, on a lowercased raw type
static TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([a-z][a-z0-9_ ]*?)\s*(?:\((.*)\))?\s*(unsigned)?\s*(zerofill)?\s*$")
        .expect("type pattern is valid")
});

/// One quoted member of an `enum('a','b')` literal
static ENUM_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'((?:[^']|'')*)'").expect("enum value pattern is valid"));

/// Length, precision and scale as reported next to a raw type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMeta {
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

/// A canonical type recovered from a live column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    pub field_type: FieldType,
    pub type_params: TypeParams,
}

/// Column type, with the parameters the builder needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    String { length: u32 },
    Text,
    Uuid,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Binary,
    Enum {
        type_name: String,
        values: Vec<String>,
        /// The named type already exists and must not be declared again
        existing: bool,
    },
}

/// Default value after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Null,
    Boolean(bool),
    Number(serde_json::Number),
    String(String),
}

/// Column-builder instruction produced from a field
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub unsigned: bool,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

/// Maps types for one dialect
#[derive(Debug, Clone, Copy)]
pub struct TypeMapper {
    dialect: Dialect,
}

impl TypeMapper {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Map a raw column type to exactly one canonical type
    pub fn reverse(&self, raw_type: &str, meta: &ColumnMeta) -> Result<MappedType> {
        let lowered = raw_type.trim().to_lowercase();
        let unknown = || Error::UnknownColumnType(raw_type.to_string());

        let caps = TYPE_PATTERN.captures(&lowered).ok_or_else(unknown)?;
        let base = caps.get(1).map_or("", |m| m.as_str().trim());
        let args = caps.get(2).map(|m| m.as_str());
        let numbers: Vec<u32> = args
            .map(|a| a.split(',').filter_map(|n| n.trim().parse().ok()).collect())
            .unwrap_or_default();
        let length = numbers.first().copied().or(meta.length);

        let mut params = TypeParams::default();
        let field_type = match base {
            "boolean" | "bool" => FieldType::Boolean,
            "tinyint" if numbers.first() == Some(&1) => FieldType::Boolean,
            "tinyint" | "smallint" | "int2" => FieldType::SmallInteger,
            "integer" | "int" | "int4" | "mediumint" => FieldType::Integer,
            "bigint" | "int8" => FieldType::BigInteger,
            "real" | "float" | "float4" => FieldType::Float,
            "double" | "double precision" | "float8" => FieldType::Double,
            "numeric" | "decimal" => {
                params.precision = numbers.first().copied().or(meta.precision);
                params.scale = numbers.get(1).copied().or(meta.scale);
                FieldType::Decimal
            }
            "varchar" | "character varying" | "nvarchar" => {
                params.length = length;
                FieldType::String
            }
            "char" | "character" | "bpchar" | "nchar" => self.reverse_char(length, &mut params),
            "text" | "tinytext" | "mediumtext" | "longtext" | "clob" => FieldType::Text,
            "uuid" => FieldType::Uuid,
            "date" => FieldType::Date,
            "time" | "time without time zone" | "time with time zone" | "timetz" => FieldType::Time,
            "datetime" | "timestamp without time zone" => FieldType::DateTime,
            "timestamp" | "timestamp with time zone" | "timestamptz" => FieldType::Timestamp,
            "json" | "jsonb" => FieldType::Json,
            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                FieldType::Binary
            }
            "enum" => {
                params.values = args.map(parse_enum_values).unwrap_or_default();
                FieldType::Enum
            }
            _ => return Err(unknown()),
        };

        params.unsigned = caps.get(3).is_some() && field_type.is_numeric();

        Ok(MappedType {
            field_type,
            type_params: params,
        })
    }

    /// Whether a raw type matches any known generic type
    pub fn is_known(&self, raw_type: &str) -> bool {
        self.reverse(raw_type, &ColumnMeta::default()).is_ok()
    }

    fn reverse_char(&self, length: Option<u32>, params: &mut TypeParams) -> FieldType {
        match self.dialect {
            Dialect::Postgres => {
                params.length = length;
                FieldType::String
            }
            _ if length == Some(36) => FieldType::Uuid,
            Dialect::Sqlite => FieldType::Text,
            Dialect::MySql | Dialect::MariaDb => {
                params.length = length;
                FieldType::String
            }
        }
    }

    /// Build the column instruction for a field
    ///
    /// `existing_type` marks enums whose synthetic type is already in the catalog.
    pub fn forward(&self, field: &Field, existing_type: bool) -> Result<ColumnSpec> {
        let params = &field.type_params;

        let kind = match field.field_type {
            FieldType::Boolean => ColumnKind::Boolean,
            FieldType::SmallInteger => ColumnKind::SmallInteger,
            FieldType::Integer => ColumnKind::Integer,
            FieldType::BigInteger => ColumnKind::BigInteger,
            FieldType::Float => ColumnKind::Float,
            FieldType::Double => ColumnKind::Double,
            FieldType::Decimal => ColumnKind::Decimal {
                precision: params.precision.unwrap_or(8),
                scale: params.scale.unwrap_or(2),
            },
            FieldType::String => ColumnKind::String {
                length: params.length.unwrap_or(255),
            },
            FieldType::Text => ColumnKind::Text,
            FieldType::Uuid => ColumnKind::Uuid,
            FieldType::Date => ColumnKind::Date,
            FieldType::Time => ColumnKind::Time,
            FieldType::DateTime => ColumnKind::DateTime,
            FieldType::Timestamp => ColumnKind::Timestamp,
            FieldType::Json => ColumnKind::Json,
            FieldType::Binary => ColumnKind::Binary,
            FieldType::Enum => {
                if params.values.is_empty() {
                    return Err(Error::InvalidSchema(format!(
                        "enum field `{}` declares no values",
                        field.reference
                    )));
                }
                ColumnKind::Enum {
                    type_name: enum_type_name(&params.values),
                    values: params.values.clone(),
                    existing: existing_type,
                }
            }
        };

        Ok(ColumnSpec {
            name: field.column_name.clone(),
            kind,
            unsigned: params.unsigned && field.field_type.is_numeric(),
            nullable: field.is_nullable() && !field.is_primary(),
            default: field.default_value.as_ref().map(coerce_default),
        })
    }
}

fn coerce_default(value: &serde_json::Value) -> DefaultValue {
    match value {
        serde_json::Value::Null => DefaultValue::Null,
        serde_json::Value::Bool(b) => DefaultValue::Boolean(*b),
        serde_json::Value::Number(n) => DefaultValue::Number(n.clone()),
        serde_json::Value::String(s) => DefaultValue::String(s.clone()),
        other => DefaultValue::String(other.to_string()),
    }
}

/// Values of an `enum('a','b')` column type, quotes unescaped
pub fn parse_enum_values(literal: &str) -> Vec<String> {
    ENUM_VALUE
        .captures_iter(literal)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("''", "'"))
        .collect()
}
