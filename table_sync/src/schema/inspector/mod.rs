//! Live database introspection
//!
//! Each dialect answers the same set of questions through [`DialectInspector`].
//! [`DatabaseInspector`] picks the adapter once and turns capabilities a dialect
//! does not have into empty answers, so callers never branch on the dialect.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::db::connection::DatabaseConnection;
use crate::db::dialect::Dialect;
use crate::error::{Error, Result};
use crate::schema::type_mapper::{ColumnMeta, TypeMapper};

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlInspector;
pub use postgres::PostgresInspector;
pub use sqlite::SqliteInspector;

/// One live column
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnInfo {
    pub name: String,
    /// Type as the catalog spells it, e.g. `varchar(40)` or `enum_3f2a…`
    pub raw_type: String,
    pub meta: ColumnMeta,
    pub nullable: bool,
    /// Default expression, verbatim
    pub default: Option<String>,
    pub primary: bool,
    /// Covered by a single-column unique constraint or index
    pub unique: bool,
}

/// One live single-column foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub column: String,
    pub remote_table: String,
    pub remote_column: String,
}

/// Multi-column unique constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// A table whose foreign key points at the inspected table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedTable {
    pub table: String,
    pub column: String,
    /// Referenced column on the inspected table
    pub local_column: String,
    pub constraint: String,
}

/// Introspection capabilities of one dialect
///
/// Optional capabilities return `Ok(None)` when they do not apply.
#[async_trait]
pub trait DialectInspector: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Base tables in the inspected schema
    async fn tables(&self) -> Result<Vec<String>>;

    /// Columns in ordinal order
    async fn column_info(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>>;

    /// Multi-column unique groups only
    async fn uniques(&self, table: &str) -> Result<Vec<UniqueInfo>>;

    /// Enum values keyed by column name
    async fn enumerators(
        &self,
        _table: &str,
        _columns: &[ColumnInfo],
    ) -> Result<Option<HashMap<String, Vec<String>>>> {
        Ok(None)
    }

    async fn is_type_exists(&self, _name: &str) -> Result<Option<bool>> {
        Ok(None)
    }

    async fn associated_tables(&self, _table: &str) -> Result<Option<Vec<AssociatedTable>>> {
        Ok(None)
    }

    async fn is_json(&self, _table: &str, _column: &str) -> Result<Option<bool>> {
        Ok(None)
    }

    /// Columns covered by any index, including key-backing ones
    async fn indexed_columns(&self, _table: &str) -> Result<Option<Vec<String>>> {
        Ok(None)
    }
}

/// Dialect-selecting introspection facade
pub struct DatabaseInspector {
    adapter: Box<dyn DialectInspector>,
}

impl DatabaseInspector {
    /// Select the adapter for a dialect tag such as `postgres` or `mariadb`
    pub fn new(tag: &str, connection: &DatabaseConnection) -> Result<Self> {
        let dialect: Dialect = tag.parse()?;

        let adapter: Box<dyn DialectInspector> = match (dialect, connection) {
            (Dialect::Postgres, DatabaseConnection::Postgres { pool, schema }) => {
                Box::new(PostgresInspector::new(pool.clone(), schema))
            }
            (
                Dialect::MySql | Dialect::MariaDb,
                DatabaseConnection::MySql(pool) | DatabaseConnection::MariaDb(pool),
            ) => Box::new(MySqlInspector::new(pool.clone(), dialect == Dialect::MariaDb)),
            (Dialect::Sqlite, DatabaseConnection::Sqlite(pool)) => {
                Box::new(SqliteInspector::new(pool.clone()))
            }
            _ => {
                return Err(Error::UnsupportedDialect(format!(
                    "{} over a {} connection",
                    tag,
                    connection.dialect()
                )))
            }
        };

        Ok(Self { adapter })
    }

    /// Adapter matching the connection's own dialect
    pub fn for_connection(connection: &DatabaseConnection) -> Result<Self> {
        Self::new(connection.dialect().as_str(), connection)
    }

    /// Wrap any adapter implementation
    pub fn from_adapter(adapter: Box<dyn DialectInspector>) -> Self {
        Self { adapter }
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    pub fn type_mapper(&self) -> TypeMapper {
        TypeMapper::new(self.dialect())
    }

    pub async fn tables(&self) -> Result<Vec<String>> {
        self.adapter.tables().await
    }

    pub async fn column_info(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.adapter.column_info(table).await
    }

    pub async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        self.adapter.foreign_keys(table).await
    }

    pub async fn uniques(&self, table: &str) -> Result<Vec<UniqueInfo>> {
        self.adapter.uniques(table).await
    }

    pub async fn enumerators(
        &self,
        table: &str,
        columns: &[ColumnInfo],
    ) -> Result<HashMap<String, Vec<String>>> {
        Ok(self.adapter.enumerators(table, columns).await?.unwrap_or_default())
    }

    pub async fn is_type_exists(&self, name: &str) -> Result<bool> {
        Ok(self.adapter.is_type_exists(name).await?.unwrap_or(false))
    }

    pub async fn associated_tables(&self, table: &str) -> Result<Vec<AssociatedTable>> {
        Ok(self.adapter.associated_tables(table).await?.unwrap_or_default())
    }

    pub async fn is_json(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self.adapter.is_json(table, column).await?.unwrap_or(false))
    }

    pub async fn indexed_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.adapter.indexed_columns(table).await?.unwrap_or_default())
    }
}

/// Group `(name, column)` rows, keeping first-seen order
pub(crate) fn group_columns(rows: impl IntoIterator<Item = (String, String)>) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for (name, column) in rows {
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, columns)) => columns.push(column),
            None => groups.push((name, vec![column])),
        }
    }
    groups
}

/// Columns of the single-column groups
pub(crate) fn single_columns(groups: &[(String, Vec<String>)]) -> Vec<String> {
    groups
        .iter()
        .filter(|(_, columns)| columns.len() == 1)
        .flat_map(|(_, columns)| columns.iter().cloned())
        .collect()
}

/// Multi-column groups as unique constraints
pub(crate) fn composite_uniques(groups: Vec<(String, Vec<String>)>) -> Vec<UniqueInfo> {
    groups
        .into_iter()
        .filter(|(_, columns)| columns.len() > 1)
        .map(|(name, columns)| UniqueInfo { name, columns })
        .collect()
}
