//! MySQL and MariaDB introspection
//!
//! Both read `information_schema` scoped to `DATABASE()`. Every selected column
//! is aliased in lowercase because MySQL 8 reports catalog labels in uppercase.
//!
//! Key membership comes from `statistics`, never from `columns.column_key`:
//! MySQL reports `PRI` there for the first unique NOT NULL key of a table
//! without a primary key.

use async_trait::async_trait;
use sqlx::{FromRow, MySqlPool};
use std::collections::HashMap;

use super::{
    composite_uniques, group_columns, single_columns, AssociatedTable, ColumnInfo, DialectInspector,
    ForeignKeyInfo, UniqueInfo,
};
use crate::db::dialect::Dialect;
use crate::error::Result;
use crate::schema::type_mapper::{parse_enum_values, ColumnMeta};

const PRIMARY_INDEX: &str = "PRIMARY";

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
    character_maximum_length: Option<i64>,
    numeric_precision: Option<i64>,
    numeric_scale: Option<i64>,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
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

/// Introspects the connection's current database
pub struct MySqlInspector {
    pool: MySqlPool,
    mariadb: bool,
}

impl MySqlInspector {
    pub fn new(pool: MySqlPool, mariadb: bool) -> Self {
        Self { pool, mariadb }
    }

    /// Unique indexes, the primary key included, grouped by index
    async fn unique_indexes(&self, table: &str) -> Result<Vec<(String, Vec<String>)>> {
        let sql = r#"
            SELECT
                CAST(index_name AS CHAR) AS index_name,
                CAST(column_name AS CHAR) AS column_name
            FROM information_schema.statistics
            WHERE
                table_schema = DATABASE()
                AND table_name = ?
                AND non_unique = 0
            ORDER BY index_name, seq_in_index
        "#;

        let rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(group_columns(rows.into_iter().map(|r| (r.index_name, r.column_name))))
    }

    /// First column pair of each foreign key matching `filter = ?`
    async fn foreign_key_rows(&self, filter: &str, table: &str) -> Result<Vec<ForeignKeyRow>> {
        let sql = format!(
            r#"
            SELECT
                CAST(constraint_name AS CHAR) AS constraint_name,
                CAST(table_name AS CHAR) AS table_name,
                CAST(column_name AS CHAR) AS column_name,
                CAST(referenced_table_name AS CHAR) AS ref_table,
                CAST(referenced_column_name AS CHAR) AS ref_column
            FROM information_schema.key_column_usage
            WHERE
                table_schema = DATABASE()
                AND referenced_table_name IS NOT NULL
                AND ordinal_position = 1
                AND {} = ?
            ORDER BY constraint_name
            "#,
            filter
        );

        Ok(sqlx::query_as::<_, ForeignKeyRow>(&sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// Split unique index groups into primary key columns and single-column uniques
fn key_columns(groups: Vec<(String, Vec<String>)>) -> (Vec<String>, Vec<String>) {
    let (primary, unique): (Vec<_>, Vec<_>) = groups
        .into_iter()
        .partition(|(name, _)| name == PRIMARY_INDEX);

    let primary = primary.into_iter().flat_map(|(_, columns)| columns).collect();
    (primary, single_columns(&unique))
}

fn to_column_info(row: ColumnRow, primary: &[String], unique: &[String]) -> ColumnInfo {
    ColumnInfo {
        primary: primary.contains(&row.column_name),
        unique: unique.contains(&row.column_name),
        meta: ColumnMeta {
            length: row.character_maximum_length.map(|n| n as u32),
            precision: row.numeric_precision.map(|n| n as u32),
            scale: row.numeric_scale.map(|n| n as u32),
        },
        nullable: row.is_nullable == "YES",
        default: row.column_default,
        raw_type: row.column_type,
        name: row.column_name,
    }
}

fn is_enum_type(raw_type: &str) -> bool {
    raw_type.trim_start().to_lowercase().starts_with("enum(")
}

/// LIKE pattern matching MariaDB's generated check for a JSON column
fn json_check_pattern(column: &str) -> String {
    format!("%json_valid(`{}`)%", column)
}

#[async_trait]
impl DialectInspector for MySqlInspector {
    fn dialect(&self) -> Dialect {
        if self.mariadb {
            Dialect::MariaDb
        } else {
            Dialect::MySql
        }
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT CAST(table_name AS CHAR) AS table_name
            FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = sqlx::query_as::<_, TableRow>(sql).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn column_info(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = r#"
            SELECT
                CAST(column_name AS CHAR) AS column_name,
                CAST(column_type AS CHAR) AS column_type,
                CAST(is_nullable AS CHAR) AS is_nullable,
                CAST(column_default AS CHAR) AS column_default,
                CAST(character_maximum_length AS SIGNED) AS character_maximum_length,
                CAST(numeric_precision AS SIGNED) AS numeric_precision,
                CAST(numeric_scale AS SIGNED) AS numeric_scale
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
        "#;

        let rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        let (primary, unique) = key_columns(self.unique_indexes(table).await?);

        Ok(rows
            .into_iter()
            .map(|row| to_column_info(row, &primary, &unique))
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        Ok(self
            .foreign_key_rows("table_name", table)
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
        let groups = self
            .unique_indexes(table)
            .await?
            .into_iter()
            .filter(|(name, _)| name != PRIMARY_INDEX)
            .collect();

        Ok(composite_uniques(groups))
    }

    async fn enumerators(
        &self,
        _table: &str,
        columns: &[ColumnInfo],
    ) -> Result<Option<HashMap<String, Vec<String>>>> {
        let values = columns
            .iter()
            .filter(|c| is_enum_type(&c.raw_type))
            .map(|c| (c.name.clone(), parse_enum_values(&c.raw_type)))
            .collect();

        Ok(Some(values))
    }

    async fn associated_tables(&self, table: &str) -> Result<Option<Vec<AssociatedTable>>> {
        let tables = self
            .foreign_key_rows("referenced_table_name", table)
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

    /// MariaDB keeps JSON as LONGTEXT behind a `json_valid` check
    async fn is_json(&self, table: &str, column: &str) -> Result<Option<bool>> {
        if !self.mariadb {
            return Ok(None);
        }

        let sql = r#"
            SELECT COUNT(*)
            FROM information_schema.check_constraints
            WHERE
                constraint_schema = DATABASE()
                AND table_name = ?
                AND check_clause LIKE ?
        "#;

        let count: i64 = sqlx::query_scalar(sql)
            .bind(table)
            .bind(json_check_pattern(column))
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(count > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn row(name: &str, column_type: &str, nullable: bool) -> ColumnRow {
        ColumnRow {
            column_name: name.to_string(),
            column_type: column_type.to_string(),
            is_nullable: if nullable { "YES" } else { "NO" }.to_string(),
            column_default: None,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    fn group(name: &str, columns: &[&str]) -> (String, Vec<String>) {
        (name.to_string(), columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_unique_not_null_column_without_primary_key_stays_unique() {
        let (primary, unique) = key_columns(vec![group("users_email_unique", &["email"])]);

        let info = to_column_info(row("email", "varchar(255)", false), &primary, &unique);

        assert!(!info.primary);
        assert!(info.unique);
        assert!(!info.nullable);
    }

    #[test]
    fn test_key_columns_separate_primary_from_uniques() {
        let (primary, unique) = key_columns(vec![
            group("PRIMARY", &["tenant_id", "id"]),
            group("users_email_unique", &["email"]),
            group("users_handle_per_org", &["org_id", "handle"]),
        ]);

        assert_eq!(primary, vec!["tenant_id".to_string(), "id".to_string()]);
        assert_eq!(unique, vec!["email".to_string()]);
    }

    #[test]
    fn test_column_meta_is_carried_over() {
        let mut source = row("price", "decimal(10,2) unsigned", true);
        source.numeric_precision = Some(10);
        source.numeric_scale = Some(2);
        source.column_default = Some("0.00".to_string());

        let info = to_column_info(source, &["id".to_string()], &[]);

        assert_eq!(
            info,
            ColumnInfo {
                name: "price".to_string(),
                raw_type: "decimal(10,2) unsigned".to_string(),
                meta: ColumnMeta {
                    length: None,
                    precision: Some(10),
                    scale: Some(2),
                },
                nullable: true,
                default: Some("0.00".to_string()),
                primary: false,
                unique: false,
            }
        );
    }

    #[rstest]
    #[case("enum('a','b')", true)]
    #[case("ENUM('a')", true)]
    #[case("  enum('x')", true)]
    #[case("enumeration", false)]
    #[case("varchar(20)", false)]
    #[case("set('a','b')", false)]
    fn test_enum_detection(#[case] raw_type: &str, #[case] expected: bool) {
        assert_eq!(is_enum_type(raw_type), expected);
    }

    #[test]
    fn test_json_check_pattern() {
        assert_eq!(json_check_pattern("payload"), "%json_valid(`payload`)%");
    }
}
