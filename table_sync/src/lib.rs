//! table_sync: keeps live database tables in line with canonical schemas
//!
//! Callers describe tables as dialect-independent [`LogicalSchema`]s and track
//! them on a [`Link`]. Each `sync()` reverse-engineers the affected tables,
//! diffs them against their schemas and applies the resulting DDL in ordered
//! phases on Postgres, MySQL/MariaDB or SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod link;
pub mod schema;
pub mod sync;
pub mod utils;

// Re-export main types for easier access
pub use config::{AlterationPolicy, SyncConfig, SyncOptions};
pub use db::{DatabaseConnection, Dialect, PhaseExecutor, StatementRunner};
pub use error::{Error, Result};
pub use link::Link;
pub use schema::{
    Associations, ChangeStep, DatabaseInspector, Field, FieldTag, FieldType, LogicalSchema, Phase,
    Relation, RelationKind, RelationTarget, SchemaCatalog,
};
pub use sync::{DatabaseSynchronizer, DeferredAlteration, SyncPlan, SyncReport};

/// Open a link from a configuration file, setting up logging first
pub async fn init(config_path: &str) -> Result<Link> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(&config.logging)?;
    Link::open(&config).await
}
