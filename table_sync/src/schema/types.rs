//! Canonical schema model
//!
//! These types describe tables independently of any dialect. Authored schemas
//! arrive from the schema API (usually as JSON); reverse-engineered ones are
//! built by [`crate::schema::reverser::SchemaReverser`].

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Tag marking a schema the synchronizer must never touch
pub const READONLY_TAG: &str = "readonly";

/// Canonical field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Boolean,
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Double,
    Decimal,
    String,
    Text,
    Uuid,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Binary,
    Enum,
}

impl FieldType {
    pub const ALL: [FieldType; 17] = [
        FieldType::Boolean,
        FieldType::SmallInteger,
        FieldType::Integer,
        FieldType::BigInteger,
        FieldType::Float,
        FieldType::Double,
        FieldType::Decimal,
        FieldType::String,
        FieldType::Text,
        FieldType::Uuid,
        FieldType::Date,
        FieldType::Time,
        FieldType::DateTime,
        FieldType::Timestamp,
        FieldType::Json,
        FieldType::Binary,
        FieldType::Enum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::SmallInteger => "smallInteger",
            FieldType::Integer => "integer",
            FieldType::BigInteger => "bigInteger",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Decimal => "decimal",
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Uuid => "uuid",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "dateTime",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
            FieldType::Binary => "binary",
            FieldType::Enum => "enum",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::SmallInteger
                | FieldType::Integer
                | FieldType::BigInteger
                | FieldType::Float
                | FieldType::Double
                | FieldType::Decimal
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type parameters; only the ones relevant to the field's type are read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeParams {
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub values: Vec<String>,
    pub unsigned: bool,
}

/// Field-level tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldTag {
    Primary,
    Nullable,
    Unique,
    Index,
}

/// A single column of a logical schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Identity key, survives column renames
    pub reference: String,
    pub column_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub type_params: TypeParams,
    #[serde(default)]
    pub tags: Vec<FieldTag>,
    /// `None` when absent; `Some(Value::Null)` is an explicit null default
    #[serde(default, deserialize_with = "deserialize_present")]
    pub default_value: Option<serde_json::Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Field {
    pub fn new(reference: &str, column_name: &str, field_type: FieldType) -> Self {
        Self {
            reference: reference.to_string(),
            column_name: column_name.to_string(),
            field_type,
            type_params: TypeParams::default(),
            tags: Vec::new(),
            default_value: None,
        }
    }

    pub fn tag(mut self, tag: FieldTag) -> Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.type_params.length = Some(length);
        self
    }

    pub fn values(mut self, values: &[&str]) -> Self {
        self.type_params.values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn has_tag(&self, tag: FieldTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_primary(&self) -> bool {
        self.has_tag(FieldTag::Primary)
    }

    /// NULLABLE tag, or an explicit null default
    pub fn is_nullable(&self) -> bool {
        self.has_tag(FieldTag::Nullable) || matches!(self.default_value, Some(serde_json::Value::Null))
    }
}

/// Relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    BelongsToOne,
    BelongsToMany,
    HasOne,
    HasMany,
}

impl RelationKind {
    /// Relations that own a foreign key column on this table
    pub fn is_owning(&self) -> bool {
        matches!(self, RelationKind::BelongsToOne | RelationKind::BelongsToMany)
    }
}

/// What a relation points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationTarget {
    /// Another logical schema, by reference
    Schema(String),
    /// A live table, as seen by reverse engineering
    Table(String),
}

/// A relation between two schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub kind: RelationKind,
    pub target: RelationTarget,
    /// Field reference on this schema (column name for `Table` targets on the remote side)
    pub local_field: String,
    pub remote_field: String,
    #[serde(default)]
    pub through: Option<String>,
    /// Live foreign key constraint name, reverse-engineered schemas only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl Relation {
    pub fn belongs_to_one(target: &str, local_field: &str, remote_field: &str) -> Self {
        Self {
            kind: RelationKind::BelongsToOne,
            target: RelationTarget::Schema(target.to_string()),
            local_field: local_field.to_string(),
            remote_field: remote_field.to_string(),
            through: None,
            constraint: None,
        }
    }
}

/// Named composite unique constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueGroup {
    pub name: String,
    /// Field references
    pub fields: Vec<String>,
}

/// Named composite index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    /// Field references
    pub fields: Vec<String>,
}

/// Dialect-independent description of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalSchema {
    pub reference: String,
    pub table_name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub uniques: Vec<UniqueGroup>,
    #[serde(default)]
    pub indices: Vec<Index>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owned by the schema API, carried through untouched
    #[serde(default)]
    pub permission: Option<serde_json::Value>,
}

impl LogicalSchema {
    pub fn new(reference: &str, table_name: &str) -> Self {
        Self {
            reference: reference.to_string(),
            table_name: table_name.to_string(),
            fields: Vec::new(),
            relations: Vec::new(),
            uniques: Vec::new(),
            indices: Vec::new(),
            tags: Vec::new(),
            permission: None,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn is_readonly(&self) -> bool {
        self.tags.iter().any(|t| t == READONLY_TAG)
    }

    pub fn get_field(&self, reference: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.reference == reference)
    }

    pub fn primary_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_primary())
    }

    /// Column name for a field reference
    pub fn column_of(&self, reference: &str) -> Option<&str> {
        self.get_field(reference).map(|f| f.column_name.as_str())
    }
}

/// Lookup of logical schemas by reference
pub trait SchemaCatalog {
    fn get_schema(&self, reference: &str) -> Option<&LogicalSchema>;

    fn get_schemas(&self) -> Vec<&LogicalSchema>;
}

/// Caller-owned record pairing a schema with its sync status
#[derive(Debug, Clone)]
pub struct Association {
    pub schema: LogicalSchema,
    pub in_sync: bool,
}

/// Tracked schemas of one link, keyed by schema reference
#[derive(Debug, Clone, Default)]
pub struct Associations {
    entries: IndexMap<String, Association>,
}

impl Associations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a schema; replacing an existing one marks it out of sync
    pub fn set_schema(&mut self, schema: LogicalSchema) {
        self.entries.insert(
            schema.reference.clone(),
            Association {
                schema,
                in_sync: false,
            },
        );
    }

    /// Track a schema the caller knows already matches the database
    pub fn set_synced(&mut self, schema: LogicalSchema) {
        self.entries.insert(
            schema.reference.clone(),
            Association {
                schema,
                in_sync: true,
            },
        );
    }

    pub fn get(&self, reference: &str) -> Option<&Association> {
        self.entries.get(reference)
    }

    pub fn remove(&mut self, reference: &str) -> Option<Association> {
        self.entries.shift_remove(reference)
    }

    /// References of associations waiting for a sync pass
    pub fn pending(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, a)| !a.in_sync)
            .map(|(reference, _)| reference.clone())
            .collect()
    }

    pub fn mark_synced(&mut self, reference: &str) {
        if let Some(association) = self.entries.get_mut(reference) {
            association.in_sync = true;
        }
    }

    pub fn is_in_sync(&self, reference: &str) -> bool {
        self.entries.get(reference).map_or(false, |a| a.in_sync)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SchemaCatalog for Associations {
    fn get_schema(&self, reference: &str) -> Option<&LogicalSchema> {
        self.entries.get(reference).map(|a| &a.schema)
    }

    fn get_schemas(&self) -> Vec<&LogicalSchema> {
        self.entries.values().map(|a| &a.schema).collect()
    }
}
