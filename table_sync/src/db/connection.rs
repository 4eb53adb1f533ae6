//! Database connection handling
//!
//! One sqlx pool per link. The executor talks to it through [`StatementRunner`]
//! so phases can be driven against anything that executes SQL.

use async_trait::async_trait;
use sqlx::{
    mysql::MySqlPoolOptions,
    postgres::PgPoolOptions,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    MySqlPool, PgPool, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::db::dialect::Dialect;
use crate::error::Result;

/// Executes a single DDL statement
#[async_trait]
pub trait StatementRunner: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// A pooled connection to one of the supported databases
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres { pool: PgPool, schema: String },
    MySql(MySqlPool),
    MariaDb(MySqlPool),
    Sqlite(SqlitePool),
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let dialect = Dialect::from_url(&config.url)?;
        let pool_size = config.pool_size.unwrap_or(10);
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));

        let connection = match dialect {
            Dialect::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;
                DatabaseConnection::Postgres {
                    pool,
                    schema: config.schema.clone().unwrap_or_else(|| "public".to_string()),
                }
            }
            Dialect::MySql | Dialect::MariaDb => {
                // sqlx only speaks the mysql:// scheme
                let url = match config.url.strip_prefix("mariadb://") {
                    Some(rest) => format!("mysql://{}", rest),
                    None => config.url.clone(),
                };
                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&url)
                    .await?;
                if dialect == Dialect::MariaDb {
                    DatabaseConnection::MariaDb(pool)
                } else {
                    DatabaseConnection::MySql(pool)
                }
            }
            Dialect::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.url)?
                    .create_if_missing(true)
                    .foreign_keys(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;
                DatabaseConnection::Sqlite(pool)
            }
        };

        tracing::debug!(dialect = %dialect, pool_size, "Opened database connection");
        Ok(connection)
    }

    /// The dialect this connection speaks
    pub fn dialect(&self) -> Dialect {
        match self {
            DatabaseConnection::Postgres { .. } => Dialect::Postgres,
            DatabaseConnection::MySql(_) => Dialect::MySql,
            DatabaseConnection::MariaDb(_) => Dialect::MariaDb,
            DatabaseConnection::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Execute a SQL statement
    pub async fn execute(&self, sql: &str) -> Result<()> {
        match self {
            DatabaseConnection::Postgres { pool, .. } => {
                sqlx::query(sql).execute(pool).await?;
            }
            DatabaseConnection::MySql(pool) | DatabaseConnection::MariaDb(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            DatabaseConnection::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Close the underlying pool, waiting for checked-out connections
    pub async fn close(&self) {
        match self {
            DatabaseConnection::Postgres { pool, .. } => pool.close().await,
            DatabaseConnection::MySql(pool) | DatabaseConnection::MariaDb(pool) => {
                pool.close().await
            }
            DatabaseConnection::Sqlite(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl StatementRunner for DatabaseConnection {
    async fn execute(&self, sql: &str) -> Result<()> {
        DatabaseConnection::execute(self, sql).await
    }
}
