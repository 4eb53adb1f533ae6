//! Change planning
//!
//! Turns one dialect-adapted target schema into phase-tagged steps: creation
//! for absent tables, column drops for present ones. Anything the database
//! cannot be moved to safely surfaces as [`Error::UnhandledAlteration`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::db::dialect::Dialect;
use crate::error::{Error, Result};
use crate::schema::adapt::dialect_name;
use crate::schema::builder::{ForeignKeySpec, SchemaBuilder, TableDefinition};
use crate::schema::inspector::DatabaseInspector;
use crate::schema::reverser::SchemaReverser;
use crate::schema::signature::{Alteration, StructuralSignature};
use crate::schema::types::{
    FieldTag, FieldType, LogicalSchema, RelationKind, RelationTarget, SchemaCatalog,
};
use crate::utils::naming;

/// Execution phases, run strictly in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Backup,
    Copy,
    Create,
    Constraint,
    Foreign,
    Drop,
}

impl Phase {
    pub const ORDERED: [Phase; 6] = [
        Phase::Backup,
        Phase::Copy,
        Phase::Create,
        Phase::Constraint,
        Phase::Foreign,
        Phase::Drop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Backup => "backup",
            Phase::Copy => "copy",
            Phase::Create => "create",
            Phase::Constraint => "constraint",
            Phase::Foreign => "foreign",
            Phase::Drop => "drop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phase-tagged unit of DDL for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeStep {
    pub phase: Phase,
    pub table: String,
    pub description: String,
    /// Run in order; empty when the dialect has nothing to do
    pub statements: Vec<String>,
}

impl ChangeStep {
    fn new(phase: Phase, table: &str, description: String, statements: Vec<String>) -> Self {
        Self {
            phase,
            table: table.to_string(),
            description,
            statements,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Plans the steps of one sync pass
pub struct ChangePlanner<'a> {
    inspector: &'a DatabaseInspector,
    reverser: SchemaReverser<'a>,
    builder: SchemaBuilder,
    backup_before_drop: bool,
    started_at: DateTime<Utc>,
}

impl<'a> ChangePlanner<'a> {
    pub fn new(inspector: &'a DatabaseInspector, backup_before_drop: bool) -> Self {
        Self {
            inspector,
            reverser: SchemaReverser::new(inspector),
            builder: SchemaBuilder::new(inspector.dialect()),
            backup_before_drop,
            started_at: Utc::now(),
        }
    }

    /// Pin the timestamp used in backup table names
    pub fn at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    fn dialect(&self) -> Dialect {
        self.builder.dialect()
    }

    /// Plan one schema against the live table list
    pub async fn plan_schema(
        &mut self,
        schema: &LogicalSchema,
        catalog: &dyn SchemaCatalog,
        live_tables: &[String],
    ) -> Result<Vec<ChangeStep>> {
        let foreign_keys = self.foreign_keys(schema, catalog)?;

        if live_tables.iter().any(|t| *t == schema.table_name) {
            self.plan_alter(schema, catalog).await
        } else {
            self.plan_create(schema, foreign_keys).await
        }
    }

    /// Resolve owning relations into foreign keys, rejecting what cannot be built
    fn foreign_keys(&self, schema: &LogicalSchema, catalog: &dyn SchemaCatalog) -> Result<Vec<ForeignKeySpec>> {
        let table = &schema.table_name;
        let invalid = |reason: String| Error::InvalidRelation {
            table: table.clone(),
            reason,
        };

        let mut keys = Vec::new();
        for relation in &schema.relations {
            match relation.kind {
                RelationKind::BelongsToMany => {
                    return Err(Error::UnsupportedRelation {
                        table: table.clone(),
                        reason: format!(
                            "BELONGS_TO_MANY on `{}` cannot be applied to the database",
                            relation.local_field
                        ),
                    })
                }
                RelationKind::HasOne | RelationKind::HasMany => continue,
                RelationKind::BelongsToOne => {}
            }

            let column = schema
                .column_of(&relation.local_field)
                .ok_or_else(|| invalid(format!("no local field `{}`", relation.local_field)))?;

            let (ref_table, ref_column) = match &relation.target {
                RelationTarget::Table(target) => (target.clone(), relation.remote_field.clone()),
                RelationTarget::Schema(reference) => {
                    let target = catalog
                        .get_schema(reference)
                        .ok_or_else(|| invalid(format!("unknown target schema `{}`", reference)))?;
                    let remote = target.get_field(&relation.remote_field).ok_or_else(|| {
                        invalid(format!("no field `{}` on `{}`", relation.remote_field, reference))
                    })?;
                    if !remote.is_primary() && !remote.has_tag(FieldTag::Unique) {
                        return Err(invalid(format!(
                            "`{}.{}` is neither PRIMARY nor UNIQUE",
                            reference, relation.remote_field
                        )));
                    }
                    (
                        dialect_name(&target.table_name, self.dialect()),
                        dialect_name(&remote.column_name, self.dialect()),
                    )
                }
            };

            keys.push(ForeignKeySpec {
                name: dialect_name(&naming::foreign_key_name(table, column), self.dialect()),
                column: column.to_string(),
                ref_table,
                ref_column,
            });
        }

        Ok(keys)
    }

    async fn plan_create(&self, schema: &LogicalSchema, foreign_keys: Vec<ForeignKeySpec>) -> Result<Vec<ChangeStep>> {
        let table = schema.table_name.as_str();
        let dialect = self.dialect();
        let mapper = self.inspector.type_mapper();

        let mut columns = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let existing = if field.field_type == FieldType::Enum && dialect.has_enum_types() {
                self.inspector
                    .is_type_exists(&naming::enum_type_name(&field.type_params.values))
                    .await?
            } else {
                false
            };
            columns.push(mapper.forward(field, existing)?);
        }

        let primary_key: Vec<String> = schema.primary_fields().map(|f| f.column_name.clone()).collect();
        let definition = TableDefinition {
            name: table.to_string(),
            columns,
            primary_key: primary_key.clone(),
            foreign_keys: foreign_keys.clone(),
        };

        let mut constraints = self.builder.add_primary_key(table, &primary_key);
        for field in &schema.fields {
            let column = field.column_name.as_str();
            if field.has_tag(FieldTag::Unique) && !field.is_primary() {
                let name = dialect_name(&naming::unique_name(table, column), dialect);
                constraints.push(self.builder.add_unique(table, &name, &[column.to_string()]));
            }
            if field.has_tag(FieldTag::Index) {
                let name = dialect_name(&naming::index_name(table, &[column]), dialect);
                constraints.push(self.builder.add_index(table, &name, &[column.to_string()]));
            }
        }
        for group in &schema.uniques {
            let name = dialect_name(&naming::group_name(table, &group.name), dialect);
            constraints.push(self.builder.add_unique(table, &name, &group_columns(schema, &group.fields)?));
        }
        for index in &schema.indices {
            let name = dialect_name(&naming::group_name(table, &index.name), dialect);
            constraints.push(self.builder.add_index(table, &name, &group_columns(schema, &index.fields)?));
        }

        let foreign = foreign_keys
            .iter()
            .flat_map(|fk| self.builder.add_foreign_key(table, fk))
            .collect();

        Ok(vec![
            ChangeStep::new(
                Phase::Create,
                table,
                format!("create table `{}`", table),
                self.builder.create_table(&definition),
            ),
            ChangeStep::new(
                Phase::Constraint,
                table,
                format!("add constraints to `{}`", table),
                constraints,
            ),
            ChangeStep::new(
                Phase::Foreign,
                table,
                format!("add foreign keys to `{}`", table),
                foreign,
            ),
        ])
    }

    async fn plan_alter(&mut self, schema: &LogicalSchema, catalog: &dyn SchemaCatalog) -> Result<Vec<ChangeStep>> {
        let table = schema.table_name.as_str();
        let live = self.reverser.to_schema(table).await?;

        let current = StructuralSignature::of(&live, catalog, self.dialect());
        let target = StructuralSignature::of(schema, catalog, self.dialect());

        let removed = match current.compare(&target) {
            None => {
                tracing::debug!(table = %table, "Table already matches its schema");
                return Ok(Vec::new());
            }
            Some(Alteration::DropColumns(columns)) => columns,
            Some(Alteration::Unhandled(changes)) => {
                return Err(Error::UnhandledAlteration {
                    table: table.to_string(),
                    changes,
                })
            }
        };

        if !self.dialect().drops_keyed_columns() {
            let keyed = self.keyed_columns(&live).await?;
            let changes: Vec<String> = removed
                .iter()
                .filter(|column| keyed.contains(column))
                .map(|column| format!("column `{}` removed while it carries a key or index", column))
                .collect();
            if !changes.is_empty() {
                return Err(Error::UnhandledAlteration {
                    table: table.to_string(),
                    changes,
                });
            }
        }

        let mut steps = Vec::new();

        if self.backup_before_drop {
            let backup = dialect_name(&naming::backup_table_name(table, self.started_at), self.dialect());
            steps.push(ChangeStep::new(
                Phase::Backup,
                table,
                format!("back up `{}` into `{}`", table, backup),
                vec![self.builder.create_backup(table, &backup)],
            ));
            steps.push(ChangeStep::new(
                Phase::Copy,
                table,
                format!("copy rows of `{}` into `{}`", table, backup),
                vec![self.builder.copy_into_backup(table, &backup)],
            ));
        }

        for column in removed {
            let mut statements = Vec::new();

            // MySQL refuses to drop a column still carrying a foreign key
            if self.dialect().is_mysql_family() {
                let constraints = live.relations.iter().filter(|r| {
                    r.kind.is_owning() && live.column_of(&r.local_field) == Some(column.as_str())
                });
                for relation in constraints {
                    if let Some(constraint) = &relation.constraint {
                        statements.extend(self.builder.drop_foreign_key(table, constraint));
                    }
                }
            }
            statements.push(self.builder.drop_column(table, &column));

            steps.push(ChangeStep::new(
                Phase::Drop,
                table,
                format!("drop column `{}` from `{}`", column, table),
                statements,
            ));
        }

        Ok(steps)
    }

    /// Live columns held by a primary key, unique constraint, foreign key or index
    async fn keyed_columns(&self, live: &LogicalSchema) -> Result<Vec<String>> {
        let table = live.table_name.as_str();
        let mut keyed = self.inspector.indexed_columns(table).await?;

        for field in &live.fields {
            if field.is_primary() || field.has_tag(FieldTag::Unique) {
                keyed.push(field.column_name.clone());
            }
        }
        for relation in live.relations.iter().filter(|r| r.kind.is_owning()) {
            if let Some(column) = live.column_of(&relation.local_field) {
                keyed.push(column.to_string());
            }
        }
        for unique in self.inspector.uniques(table).await? {
            keyed.extend(unique.columns);
        }

        Ok(keyed)
    }
}

/// Column names of a composite group's field references
fn group_columns(schema: &LogicalSchema, references: &[String]) -> Result<Vec<String>> {
    references
        .iter()
        .map(|reference| {
            schema.column_of(reference).map(str::to_string).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "`{}` groups unknown field `{}`",
                    schema.reference, reference
                ))
            })
        })
        .collect()
}
