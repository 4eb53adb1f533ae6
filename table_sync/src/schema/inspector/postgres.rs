//! PostgreSQL introspection
//!
//! Catalog columns are cast to `text`/`int4` in every query: `information_schema`
//! exposes its own domain types, which do not decode as plain strings.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use super::{
    composite_uniques, group_columns, single_columns, AssociatedTable, ColumnInfo, DialectInspector,
    ForeignKeyInfo, UniqueInfo,
};
use crate::db::dialect::Dialect;
use crate::error::Result;
use crate::schema::type_mapper::{ColumnMeta, TypeMapper};

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    udt_name: String,
    is_nullable: String,
    column_default: Option<String>,
    character_maximum_length: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
}

#[derive(FromRow)]
struct KeyColumnRow {
    constraint_name: String,
    column_name: String,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    table_name: String,
    column_name: String,
    ref_table: String,
    ref_column: String,
}

#[derive(FromRow)]
struct EnumRow {
    column_name: String,
    label: String,
}

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        tc.constraint_name::text AS constraint_name,
        tc.table_name::text AS table_name,
        kcu.column_name::text AS column_name,
        ccu.table_name::text AS ref_table,
        ccu.column_name::text AS ref_column
    FROM
        information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
        ON ccu.constraint_name = tc.constraint_name
        AND ccu.table_schema = tc.table_schema
    WHERE
        tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1
"#;

/// Introspects one Postgres schema (`public` unless configured)
pub struct PostgresInspector {
    pool: PgPool,
    schema: String,
}

impl PostgresInspector {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    /// Column sets of the table's constraints of one type, in key order
    async fn constraint_columns(&self, table: &str, constraint_type: &str) -> Result<Vec<(String, Vec<String>)>> {
        let sql = r#"
            SELECT
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name
            FROM
                information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE
                tc.constraint_type = $3
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY tc.constraint_name, kcu.ordinal_position
        "#;

        let rows = sqlx::query_as::<_, KeyColumnRow>(sql)
            .bind(&self.schema)
            .bind(table)
            .bind(constraint_type)
            .fetch_all(&self.pool)
            .await?;

        Ok(group_columns(rows.into_iter().map(|r| (r.constraint_name, r.column_name))))
    }

    async fn foreign_key_rows(&self, filter: &str, table: &str) -> Result<Vec<ForeignKeyRow>> {
        let sql = format!("{} AND {} = $2 ORDER BY tc.constraint_name, kcu.ordinal_position", FOREIGN_KEYS_SQL, filter);

        let rows = sqlx::query_as::<_, ForeignKeyRow>(&sql)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(first_column_pairs(rows))
    }
}

/// Composite keys fan out into one row per column; keep each constraint's first
fn first_column_pairs(rows: Vec<ForeignKeyRow>) -> Vec<ForeignKeyRow> {
    let mut seen = Vec::new();
    rows.into_iter()
        .filter(|row| {
            if seen.contains(&row.constraint_name) {
                false
            } else {
                seen.push(row.constraint_name.clone());
                true
            }
        })
        .collect()
}

fn to_column_info(row: ColumnRow, primary: &[String], unique: &[String]) -> ColumnInfo {
    // Enum and domain columns only name their type in udt_name
    let raw_type = if matches!(row.data_type.as_str(), "USER-DEFINED" | "ARRAY") {
        row.udt_name
    } else {
        row.data_type
    };

    ColumnInfo {
        primary: primary.contains(&row.column_name),
        unique: unique.contains(&row.column_name),
        raw_type,
        meta: ColumnMeta {
            length: row.character_maximum_length.map(|n| n as u32),
            precision: row.numeric_precision.map(|n| n as u32),
            scale: row.numeric_scale.map(|n| n as u32),
        },
        nullable: row.is_nullable == "YES",
        default: row.column_default,
        name: row.column_name,
    }
}

/// Columns whose type the mapper does not know; only these can be enums
fn enum_candidates(columns: &[ColumnInfo]) -> Vec<String> {
    let mapper = TypeMapper::new(Dialect::Postgres);
    columns
        .iter()
        .filter(|c| !mapper.is_known(&c.raw_type))
        .map(|c| c.name.clone())
        .collect()
}

#[async_trait]
impl DialectInspector for PostgresInspector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = sqlx::query_as::<_, TableRow>(sql)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn column_info(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                udt_name::text AS udt_name,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                character_maximum_length::int4 AS character_maximum_length,
                numeric_precision::int4 AS numeric_precision,
                numeric_scale::int4 AS numeric_scale
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let primary: Vec<String> = self
            .constraint_columns(table, "PRIMARY KEY")
            .await?
            .into_iter()
            .flat_map(|(_, columns)| columns)
            .collect();
        let unique = single_columns(&self.constraint_columns(table, "UNIQUE").await?);

        Ok(rows
            .into_iter()
            .map(|row| to_column_info(row, &primary, &unique))
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        Ok(self
            .foreign_key_rows("tc.table_name", table)
            .await?
            .into_iter()
            .map(|row| ForeignKeyInfo {
                name: row.constraint_name,
                column: row.column_name,
                remote_table: row.ref_table,
                remote_column: row.ref_column,
            })
            .collect())
    }

    async fn uniques(&self, table: &str) -> Result<Vec<UniqueInfo>> {
        Ok(composite_uniques(self.constraint_columns(table, "UNIQUE").await?))
    }

    async fn enumerators(
        &self,
        table: &str,
        columns: &[ColumnInfo],
    ) -> Result<Option<HashMap<String, Vec<String>>>> {
        let candidates = enum_candidates(columns);

        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        if candidates.is_empty() {
            return Ok(Some(values));
        }

        let sql = r#"
            SELECT
                c.column_name::text AS column_name,
                e.enumlabel::text AS label
            FROM information_schema.columns c
            JOIN pg_type t ON t.typname = c.udt_name
            JOIN pg_namespace n ON n.oid = t.typnamespace AND n.nspname = c.udt_schema
            JOIN pg_enum e ON e.enumtypid = t.oid
            WHERE
                c.table_schema = $1
                AND c.table_name = $2
                AND c.column_name::text = ANY($3)
            ORDER BY c.column_name, e.enumsortorder
        "#;

        let rows = sqlx::query_as::<_, EnumRow>(sql)
            .bind(&self.schema)
            .bind(table)
            .bind(&candidates)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            values.entry(row.column_name).or_default().push(row.label);
        }

        Ok(Some(values))
    }

    async fn is_type_exists(&self, name: &str) -> Result<Option<bool>> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_type WHERE typname = $1)")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(found))
    }

    async fn associated_tables(&self, table: &str) -> Result<Option<Vec<AssociatedTable>>> {
        let tables = self
            .foreign_key_rows("ccu.table_name", table)
            .await?
            .into_iter()
            .map(|row| AssociatedTable {
                table: row.table_name,
                column: row.column_name,
                local_column: row.ref_column,
                constraint: row.constraint_name,
            })
            .collect();

        Ok(Some(tables))
    }
}
