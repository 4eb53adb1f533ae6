//! Structural signatures for schema comparison
//!
//! A signature keeps only what the live database can faithfully report back:
//! column order, canonical types, PRIMARY/NULLABLE/UNIQUE and sorted enum
//! values, plus the foreign keys behind owning relations. Two schemas describe
//! the same table exactly when their signatures are equal.

use std::collections::BTreeSet;

use crate::db::dialect::Dialect;
use crate::schema::adapt::dialect_name;
use crate::schema::types::{
    FieldTag, FieldType, LogicalSchema, Relation, RelationTarget, SchemaCatalog,
};

/// Comparable shape of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSignature {
    pub column: String,
    pub field_type: FieldType,
    pub tags: BTreeSet<FieldTag>,
    /// Sorted, enums only
    pub values: Vec<String>,
}

/// Comparable shape of one owning relation
///
/// Only the foreign key is kept. The live side guesses BELONGS_TO_ONE or
/// BELONGS_TO_MANY from the remote primary key, so the kind cannot round-trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelationSignature {
    pub local_column: String,
    pub target_table: String,
    pub remote_column: String,
}

/// Dialect-neutral structure of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralSignature {
    pub table: String,
    pub fields: Vec<FieldSignature>,
    pub relations: BTreeSet<RelationSignature>,
}

/// Outcome of comparing a live signature with a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alteration {
    /// Target equals the live table minus these columns
    DropColumns(Vec<String>),
    /// Anything else, described for the operator
    Unhandled(Vec<String>),
}

impl StructuralSignature {
    /// Signature of a schema whose names are already adapted to `dialect`
    pub fn of(schema: &LogicalSchema, catalog: &dyn SchemaCatalog, dialect: Dialect) -> Self {
        let fields = schema
            .fields
            .iter()
            .map(|field| {
                let primary = field.is_primary();
                let mut tags = BTreeSet::new();
                if primary {
                    tags.insert(FieldTag::Primary);
                } else {
                    if field.is_nullable() {
                        tags.insert(FieldTag::Nullable);
                    }
                    if field.has_tag(FieldTag::Unique) {
                        tags.insert(FieldTag::Unique);
                    }
                }

                let mut values = Vec::new();
                if field.field_type == FieldType::Enum {
                    values = field.type_params.values.clone();
                    values.sort();
                }

                FieldSignature {
                    column: field.column_name.clone(),
                    field_type: field.field_type,
                    tags,
                    values,
                }
            })
            .collect();

        let relations = schema
            .relations
            .iter()
            .filter(|relation| relation.kind.is_owning())
            .map(|relation| relation_signature(schema, relation, catalog, dialect))
            .collect();

        Self {
            table: schema.table_name.clone(),
            fields,
            relations,
        }
    }

    fn field(&self, column: &str) -> Option<&FieldSignature> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Compare a live table (`self`) with its target; `None` when identical
    pub fn compare(&self, target: &StructuralSignature) -> Option<Alteration> {
        if self == target {
            return None;
        }

        let removed: Vec<String> = self
            .fields
            .iter()
            .filter(|f| target.field(&f.column).is_none())
            .map(|f| f.column.clone())
            .collect();

        let remaining = StructuralSignature {
            table: self.table.clone(),
            fields: self
                .fields
                .iter()
                .filter(|f| !removed.contains(&f.column))
                .cloned()
                .collect(),
            relations: self
                .relations
                .iter()
                .filter(|r| !removed.contains(&r.local_column))
                .cloned()
                .collect(),
        };

        if !removed.is_empty() && remaining == *target {
            return Some(Alteration::DropColumns(removed));
        }

        Some(Alteration::Unhandled(self.describe_changes(&remaining, target, &removed)))
    }

    fn describe_changes(
        &self,
        remaining: &StructuralSignature,
        target: &StructuralSignature,
        removed: &[String],
    ) -> Vec<String> {
        let mut changes = Vec::new();

        for column in removed {
            changes.push(format!("column `{}` removed", column));
        }

        for wanted in &target.fields {
            match remaining.field(&wanted.column) {
                None => changes.push(format!("column `{}` added", wanted.column)),
                Some(live) => {
                    if live.field_type != wanted.field_type {
                        changes.push(format!(
                            "column `{}` changes type from {} to {}",
                            wanted.column, live.field_type, wanted.field_type
                        ));
                    }
                    if live.tags != wanted.tags {
                        changes.push(format!(
                            "column `{}` changes tags from {:?} to {:?}",
                            wanted.column, live.tags, wanted.tags
                        ));
                    }
                    if live.values != wanted.values {
                        changes.push(format!(
                            "column `{}` changes enum values from {:?} to {:?}",
                            wanted.column, live.values, wanted.values
                        ));
                    }
                }
            }
        }

        let live_order: Vec<&str> = remaining
            .fields
            .iter()
            .filter(|f| target.field(&f.column).is_some())
            .map(|f| f.column.as_str())
            .collect();
        let wanted_order: Vec<&str> = target
            .fields
            .iter()
            .filter(|f| remaining.field(&f.column).is_some())
            .map(|f| f.column.as_str())
            .collect();
        if live_order != wanted_order {
            changes.push(format!(
                "columns reordered from {:?} to {:?}",
                live_order, wanted_order
            ));
        }

        for relation in target.relations.difference(&remaining.relations) {
            changes.push(format!("relation {} added", describe_relation(relation)));
        }
        for relation in remaining.relations.difference(&target.relations) {
            changes.push(format!("relation {} removed", describe_relation(relation)));
        }

        if changes.is_empty() {
            changes.push(format!("table `{}` differs structurally", target.table));
        }

        changes
    }
}

fn describe_relation(relation: &RelationSignature) -> String {
    format!(
        "foreign key `{}` -> `{}`.`{}`",
        relation.local_column, relation.target_table, relation.remote_column
    )
}

fn relation_signature(
    schema: &LogicalSchema,
    relation: &Relation,
    catalog: &dyn SchemaCatalog,
    dialect: Dialect,
) -> RelationSignature {
    let local_column = schema
        .column_of(&relation.local_field)
        .unwrap_or(&relation.local_field)
        .to_string();

    let (target_table, remote_column) = match &relation.target {
        RelationTarget::Table(table) => (table.clone(), relation.remote_field.clone()),
        RelationTarget::Schema(reference) => match catalog.get_schema(reference) {
            Some(target) => (
                dialect_name(&target.table_name, dialect),
                dialect_name(
                    target.column_of(&relation.remote_field).unwrap_or(&relation.remote_field),
                    dialect,
                ),
            ),
            None => (reference.clone(), relation.remote_field.clone()),
        },
    };

    RelationSignature {
        local_column,
        target_table,
        remote_column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{Associations, Field, RelationKind};
    use pretty_assertions::assert_eq;

    fn catalog() -> Associations {
        let mut associations = Associations::new();
        associations.set_schema(
            LogicalSchema::new("category", "categories")
                .field(Field::new("id", "id", FieldType::Uuid).tag(FieldTag::Primary)),
        );
        associations
    }

    fn target() -> LogicalSchema {
        LogicalSchema::new("product", "products")
            .field(Field::new("id", "id", FieldType::Uuid).tag(FieldTag::Primary))
            .field(Field::new("name", "name", FieldType::String).length(40))
            .field(Field::new("categoryId", "category_id", FieldType::Uuid))
            .relation(crate::schema::types::Relation::belongs_to_one("category", "categoryId", "id"))
    }

    /// The same table as the reverser would report it
    fn live() -> LogicalSchema {
        LogicalSchema::new("products", "products")
            .field(
                Field::new("id", "id", FieldType::Uuid)
                    .tag(FieldTag::Primary)
                    .tag(FieldTag::Nullable),
            )
            .field(Field::new("name", "name", FieldType::String).length(255))
            .field(Field::new("categoryId", "category_id", FieldType::Uuid))
            .relation(Relation {
                kind: RelationKind::BelongsToOne,
                target: RelationTarget::Table("categories".to_string()),
                local_field: "categoryId".to_string(),
                remote_field: "id".to_string(),
                through: None,
                constraint: Some("products_category_id_foreign".to_string()),
            })
            .relation(Relation {
                kind: RelationKind::HasMany,
                target: RelationTarget::Table("reviews".to_string()),
                local_field: "id".to_string(),
                remote_field: "product_id".to_string(),
                through: None,
                constraint: None,
            })
    }

    fn signature(schema: &LogicalSchema) -> StructuralSignature {
        StructuralSignature::of(schema, &catalog(), Dialect::Postgres)
    }

    #[test]
    fn test_live_and_target_signatures_match() {
        let live = signature(&live());
        let target = signature(&target());

        assert_eq!(live, target);
        assert_eq!(live.compare(&target), None);
        assert_eq!(
            target.fields[0].tags.iter().copied().collect::<Vec<_>>(),
            vec![FieldTag::Primary]
        );
    }

    #[test]
    fn test_enum_values_compare_unordered() {
        let a = LogicalSchema::new("t", "t").field(Field::new("s", "s", FieldType::Enum).values(&["x", "y"]));
        let b = LogicalSchema::new("t", "t").field(Field::new("s", "s", FieldType::Enum).values(&["y", "x"]));
        assert_eq!(signature(&a), signature(&b));
    }

    #[test]
    fn test_removed_columns_are_droppable() {
        let live = signature(&live());
        let mut target = target();
        target.fields.retain(|f| f.reference != "name");

        assert_eq!(
            live.compare(&signature(&target)),
            Some(Alteration::DropColumns(vec!["name".to_string()]))
        );
    }

    #[test]
    fn test_removing_a_foreign_key_column_drops_its_relation() {
        let live = signature(&live());
        let mut target = target();
        target.fields.retain(|f| f.reference != "categoryId");
        target.relations.clear();

        assert_eq!(
            live.compare(&signature(&target)),
            Some(Alteration::DropColumns(vec!["category_id".to_string()]))
        );
    }

    #[test]
    fn test_other_changes_are_unhandled() {
        let live = signature(&live());
        let mut target = target();
        target.fields[1].field_type = FieldType::Text;
        target.fields.push(Field::new("price", "price", FieldType::Decimal));

        match live.compare(&signature(&target)) {
            Some(Alteration::Unhandled(changes)) => assert_eq!(
                changes,
                vec![
                    "column `name` changes type from string to text".to_string(),
                    "column `price` added".to_string(),
                ]
            ),
            other => panic!("expected unhandled alteration, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_key_to_unique_field_matches_regardless_of_kind() {
        let mut catalog = catalog();
        catalog.set_schema(
            LogicalSchema::new("tag", "tags")
                .field(Field::new("slug", "slug", FieldType::String).tag(FieldTag::Unique)),
        );
        let target = LogicalSchema::new("post", "posts")
            .field(Field::new("tagSlug", "tag_slug", FieldType::String))
            .relation(Relation::belongs_to_one("tag", "tagSlug", "slug"));
        // `tags` has no primary key, so the reverser reports a join-style relation
        let live = LogicalSchema::new("posts", "posts")
            .field(Field::new("tagSlug", "tag_slug", FieldType::String))
            .relation(Relation {
                kind: RelationKind::BelongsToMany,
                target: RelationTarget::Table("tags".to_string()),
                local_field: "tagSlug".to_string(),
                remote_field: "slug".to_string(),
                through: None,
                constraint: Some("posts_tag_slug_foreign".to_string()),
            });

        let live = StructuralSignature::of(&live, &catalog, Dialect::Sqlite);
        let target = StructuralSignature::of(&target, &catalog, Dialect::Sqlite);

        assert_eq!(live.compare(&target), None);
    }

    #[test]
    fn test_reorder_is_unhandled() {
        let live = signature(&live());
        let mut target = target();
        target.fields.swap(1, 2);

        match live.compare(&signature(&target)) {
            Some(Alteration::Unhandled(changes)) => {
                assert_eq!(changes.len(), 1);
                assert!(changes[0].starts_with("columns reordered"));
            }
            other => panic!("expected unhandled alteration, got {:?}", other),
        }
    }
}
