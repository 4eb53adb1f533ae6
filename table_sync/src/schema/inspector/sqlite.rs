//! SQLite introspection through the table-valued pragma functions

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

use super::{composite_uniques, group_columns, single_columns, ColumnInfo, DialectInspector, ForeignKeyInfo, UniqueInfo};
use crate::db::dialect::Dialect;
use crate::error::Result;
use crate::schema::type_mapper::ColumnMeta;
use crate::utils::naming;

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    name: String,
    raw_type: String,
    not_null: i64,
    default_value: Option<String>,
    pk: i64,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    column_name: Option<String>,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    seq: i64,
    ref_table: String,
    column_name: String,
    ref_column: Option<String>,
}

/// Introspects the `main` database of a SQLite pool
pub struct SqliteInspector {
    pool: SqlitePool,
}

impl SqliteInspector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Unique indexes not backing the primary key, grouped by index
    async fn unique_groups(&self, table: &str) -> Result<Vec<(String, Vec<String>)>> {
        let sql = r#"
            SELECT il.name AS index_name, ii.name AS column_name
            FROM pragma_index_list(?1) AS il
            JOIN pragma_index_info(il.name) AS ii
            WHERE il."unique" = 1 AND il.origin <> 'pk'
            ORDER BY il.name, ii.seqno
        "#;

        let rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(group_columns(
            rows.into_iter()
                .filter_map(|r| r.column_name.map(|column| (r.index_name, column))),
        ))
    }

    async fn column_rows(&self, table: &str) -> Result<Vec<ColumnRow>> {
        let sql = r#"
            SELECT name, type AS raw_type, "notnull" AS not_null, dflt_value AS default_value, pk
            FROM pragma_table_info(?1)
            ORDER BY cid
        "#;

        Ok(sqlx::query_as::<_, ColumnRow>(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl DialectInspector for SqliteInspector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT name AS table_name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
        "#;

        let rows = sqlx::query_as::<_, TableRow>(sql).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn column_info(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self.column_rows(table).await?;
        let unique = single_columns(&self.unique_groups(table).await?);

        Ok(rows
            .into_iter()
            .map(|row| ColumnInfo {
                unique: unique.contains(&row.name),
                raw_type: row.raw_type,
                meta: ColumnMeta::default(),
                nullable: row.not_null == 0 && row.pk == 0,
                default: row.default_value,
                primary: row.pk > 0,
                name: row.name,
            })
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let sql = r#"
            SELECT seq, "table" AS ref_table, "from" AS column_name, "to" AS ref_column
            FROM pragma_foreign_key_list(?1)
            ORDER BY id, seq
        "#;

        let rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut keys = Vec::new();
        for row in rows.into_iter().filter(|r| r.seq == 0) {
            // A bare REFERENCES points at the remote primary key
            let remote_column = match row.ref_column {
                Some(column) => column,
                None => self
                    .column_rows(&row.ref_table)
                    .await?
                    .into_iter()
                    .find(|c| c.pk == 1)
                    .map(|c| c.name)
                    .unwrap_or_default(),
            };

            // Foreign keys are anonymous to the pragma; name them the way the builder does
            keys.push(ForeignKeyInfo {
                name: naming::foreign_key_name(table, &row.column_name),
                column: row.column_name,
                remote_table: row.ref_table,
                remote_column,
            });
        }

        Ok(keys)
    }

    async fn uniques(&self, table: &str) -> Result<Vec<UniqueInfo>> {
        Ok(composite_uniques(self.unique_groups(table).await?))
    }

    async fn indexed_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let sql = r#"
            SELECT DISTINCT ii.name AS column_name
            FROM pragma_index_list(?1) AS il
            JOIN pragma_index_info(il.name) AS ii
            WHERE ii.name IS NOT NULL
            ORDER BY ii.name
        "#;

        let columns: Vec<String> = sqlx::query_scalar(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(columns))
    }
}
