//! Dialect adaptation of authored schemas

use crate::db::dialect::Dialect;
use crate::schema::types::{FieldType, LogicalSchema};
use crate::utils::naming::truncate_identifier;

/// An identifier as the dialect will store it
pub fn dialect_name(name: &str, dialect: Dialect) -> String {
    truncate_identifier(name, dialect.max_identifier_length())
}

/// Fit a schema to the dialect's naming limits and type support
///
/// Enum fields become text where the dialect has no enum type.
pub fn to_dialect_schema(schema: &LogicalSchema, dialect: Dialect) -> LogicalSchema {
    let mut adapted = schema.clone();
    adapted.table_name = dialect_name(&schema.table_name, dialect);

    for field in &mut adapted.fields {
        field.column_name = dialect_name(&field.column_name, dialect);
        if field.field_type == FieldType::Enum && !dialect.supports_enums() {
            field.field_type = FieldType::Text;
            field.type_params.values.clear();
        }
    }

    adapted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::Field;

    #[test]
    fn test_long_names_are_truncated() {
        let long = "a".repeat(70);
        let schema = LogicalSchema::new("thing", &long).field(Field::new("f", &long, FieldType::Text));

        let adapted = to_dialect_schema(&schema, Dialect::Postgres);
        assert_eq!(adapted.table_name.len(), 63);
        assert_eq!(adapted.fields[0].column_name.len(), 63);

        let adapted = to_dialect_schema(&schema, Dialect::MySql);
        assert_eq!(adapted.table_name.len(), 64);

        assert_eq!(to_dialect_schema(&schema, Dialect::Sqlite).table_name, long);
    }

    #[test]
    fn test_sqlite_enums_become_text() {
        let schema = LogicalSchema::new("task", "tasks")
            .field(Field::new("state", "state", FieldType::Enum).values(&["open", "closed"]));

        let adapted = to_dialect_schema(&schema, Dialect::Sqlite);
        assert_eq!(adapted.fields[0].field_type, FieldType::Text);
        assert!(adapted.fields[0].type_params.values.is_empty());

        let adapted = to_dialect_schema(&schema, Dialect::MariaDb);
        assert_eq!(adapted.fields[0].field_type, FieldType::Enum);
    }
}
