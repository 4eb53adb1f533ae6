//! Reverse engineering of live tables
//!
//! The schema produced here only feeds the diff. It cannot recover authored
//! references, so it re-derives them from column and table names.

use std::collections::HashMap;

use crate::db::dialect::Dialect;
use crate::error::Result;
use crate::schema::inspector::DatabaseInspector;
use crate::schema::type_mapper::MappedType;
use crate::schema::types::{
    Field, FieldTag, FieldType, LogicalSchema, Relation, RelationKind, RelationTarget, TypeParams,
    UniqueGroup,
};
use crate::utils::naming::{derive_reference, strip_table_prefix};

/// Builds canonical schemas from introspection
pub struct SchemaReverser<'a> {
    inspector: &'a DatabaseInspector,
    /// Primary key column counts, per remote table
    primary_counts: HashMap<String, usize>,
}

impl<'a> SchemaReverser<'a> {
    pub fn new(inspector: &'a DatabaseInspector) -> Self {
        Self {
            inspector,
            primary_counts: HashMap::new(),
        }
    }

    /// Reverse-engineer one live table
    pub async fn to_schema(&mut self, table: &str) -> Result<LogicalSchema> {
        let columns = self.inspector.column_info(table).await?;
        let enums = self.inspector.enumerators(table, &columns).await?;
        let mapper = self.inspector.type_mapper();
        let dialect = self.inspector.dialect();

        let mut schema = LogicalSchema::new(&derive_reference(table), table);

        for column in &columns {
            let mut mapped = match enums.get(&column.name) {
                Some(values) => MappedType {
                    field_type: FieldType::Enum,
                    type_params: TypeParams {
                        values: values.clone(),
                        ..TypeParams::default()
                    },
                },
                None => mapper.reverse(&column.raw_type, &column.meta)?,
            };

            if dialect == Dialect::MariaDb
                && mapped.field_type == FieldType::Text
                && self.inspector.is_json(table, &column.name).await?
            {
                mapped.field_type = FieldType::Json;
            }

            let mut field = Field::new(&derive_reference(&column.name), &column.name, mapped.field_type);
            field.type_params = mapped.type_params;
            field.default_value = column.default.clone().map(serde_json::Value::String);
            if column.primary {
                field = field.tag(FieldTag::Primary);
            } else {
                if column.nullable {
                    field = field.tag(FieldTag::Nullable);
                }
                if column.unique {
                    field = field.tag(FieldTag::Unique);
                }
            }

            schema.fields.push(field);
        }

        for foreign_key in self.inspector.foreign_keys(table).await? {
            // Several key columns on the far side reads as a join table
            let kind = if self.primary_count(&foreign_key.remote_table).await? == 1 {
                RelationKind::BelongsToOne
            } else {
                RelationKind::BelongsToMany
            };

            schema.relations.push(Relation {
                kind,
                target: RelationTarget::Table(foreign_key.remote_table),
                local_field: derive_reference(&foreign_key.column),
                remote_field: foreign_key.remote_column,
                through: None,
                constraint: Some(foreign_key.name),
            });
        }

        for associated in self.inspector.associated_tables(table).await? {
            schema.relations.push(Relation {
                kind: RelationKind::HasMany,
                target: RelationTarget::Table(associated.table),
                local_field: derive_reference(&associated.local_column),
                remote_field: associated.column,
                through: None,
                constraint: Some(associated.constraint),
            });
        }

        schema.uniques = self
            .inspector
            .uniques(table)
            .await?
            .into_iter()
            .map(|unique| UniqueGroup {
                name: strip_table_prefix(table, &unique.name).to_string(),
                fields: unique.columns.iter().map(|c| derive_reference(c)).collect(),
            })
            .collect();

        tracing::debug!(
            table = %table,
            fields = schema.fields.len(),
            relations = schema.relations.len(),
            "Reverse-engineered table"
        );

        Ok(schema)
    }

    async fn primary_count(&mut self, table: &str) -> Result<usize> {
        if let Some(count) = self.primary_counts.get(table) {
            return Ok(*count);
        }

        let count = self
            .inspector
            .column_info(table)
            .await?
            .iter()
            .filter(|c| c.primary)
            .count();
        self.primary_counts.insert(table.to_string(), count);

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::inspector::testing::{column, primary, StaticInspector, StaticTable};
    use crate::schema::inspector::{ForeignKeyInfo, UniqueInfo};
    use pretty_assertions::assert_eq;

    fn inspector() -> DatabaseInspector {
        let categories = StaticTable {
            columns: vec![primary("id", "uuid")],
            ..StaticTable::default()
        };
        let tags = StaticTable {
            columns: vec![
                primary("post_id", "uuid"),
                primary("tag_id", "uuid"),
            ],
            ..StaticTable::default()
        };
        let mut status = column("status", "enum_0a1b");
        status.nullable = true;
        let mut slug = column("slug", "character varying");
        slug.unique = true;
        slug.meta.length = Some(80);
        let posts = StaticTable {
            columns: vec![
                primary("id", "uuid"),
                column("category_id", "uuid"),
                column("tag_id", "uuid"),
                slug,
                column("author", "text"),
                status,
            ],
            foreign_keys: vec![
                ForeignKeyInfo {
                    name: "posts_category_id_foreign".to_string(),
                    column: "category_id".to_string(),
                    remote_table: "categories".to_string(),
                    remote_column: "id".to_string(),
                },
                ForeignKeyInfo {
                    name: "posts_tag_id_foreign".to_string(),
                    column: "tag_id".to_string(),
                    remote_table: "post_tags".to_string(),
                    remote_column: "tag_id".to_string(),
                },
            ],
            uniques: vec![UniqueInfo {
                name: "posts_author_slug".to_string(),
                columns: vec!["author".to_string(), "slug".to_string()],
            }],
            enums: [("status".to_string(), vec!["draft".to_string(), "live".to_string()])]
                .into_iter()
                .collect(),
            ..StaticTable::default()
        };

        DatabaseInspector::from_adapter(Box::new(
            StaticInspector::new(Dialect::Postgres)
                .table("categories", categories)
                .table("post_tags", tags)
                .table("posts", posts),
        ))
    }

    #[tokio::test]
    async fn test_reverse_engineers_fields() {
        let inspector = inspector();
        let schema = SchemaReverser::new(&inspector).to_schema("posts").await.unwrap();

        assert_eq!(schema.reference, "posts");
        let references: Vec<&str> = schema.fields.iter().map(|f| f.reference.as_str()).collect();
        assert_eq!(references, vec!["id", "categoryId", "tagId", "slug", "author", "status"]);

        assert_eq!(schema.fields[0].tags, vec![FieldTag::Primary]);
        assert_eq!(schema.fields[3].field_type, FieldType::String);
        assert_eq!(schema.fields[3].type_params.length, Some(80));
        assert_eq!(schema.fields[3].tags, vec![FieldTag::Unique]);
        assert_eq!(schema.fields[5].field_type, FieldType::Enum);
        assert_eq!(schema.fields[5].type_params.values, vec!["draft", "live"]);
        assert_eq!(schema.fields[5].tags, vec![FieldTag::Nullable]);

        assert_eq!(
            schema.uniques,
            vec![UniqueGroup {
                name: "author_slug".to_string(),
                fields: vec!["author".to_string(), "slug".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_relation_kind_follows_remote_primary_key() {
        let inspector = inspector();
        let schema = SchemaReverser::new(&inspector).to_schema("posts").await.unwrap();

        assert_eq!(schema.relations.len(), 2);
        assert_eq!(schema.relations[0].kind, RelationKind::BelongsToOne);
        assert_eq!(schema.relations[0].target, RelationTarget::Table("categories".to_string()));
        assert_eq!(schema.relations[0].local_field, "categoryId");
        assert_eq!(schema.relations[0].remote_field, "id");
        assert_eq!(schema.relations[0].constraint.as_deref(), Some("posts_category_id_foreign"));
        assert_eq!(schema.relations[1].kind, RelationKind::BelongsToMany);
    }

    #[tokio::test]
    async fn test_unknown_raw_type_fails() {
        let table = StaticTable {
            columns: vec![column("search", "tsvector")],
            ..StaticTable::default()
        };
        let inspector = DatabaseInspector::from_adapter(Box::new(
            StaticInspector::new(Dialect::Postgres).table("docs", table),
        ));

        let result = SchemaReverser::new(&inspector).to_schema("docs").await;
        assert!(matches!(result, Err(crate::error::Error::UnknownColumnType(raw)) if raw == "tsvector"));
    }
}
