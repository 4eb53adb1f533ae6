//! Database link
//!
//! A link owns one connection pool and the associations tracked against it.

use std::sync::Arc;

use crate::config::{SyncConfig, SyncOptions};
use crate::db::connection::DatabaseConnection;
use crate::db::dialect::Dialect;
use crate::error::Result;
use crate::schema::adapt;
use crate::schema::builder::SchemaBuilder;
use crate::schema::inspector::DatabaseInspector;
use crate::schema::signature::StructuralSignature;
use crate::schema::types::{Associations, LogicalSchema, SchemaCatalog};
use crate::sync::{DatabaseSynchronizer, SyncPlan, SyncReport};

/// A database and the schemas kept in sync with it
pub struct Link {
    connection: DatabaseConnection,
    associations: Associations,
    options: SyncOptions,
}

impl Link {
    /// Connect using the database and sync sections of a configuration
    pub async fn open(config: &SyncConfig) -> Result<Self> {
        let connection = DatabaseConnection::connect(&config.database).await?;

        tracing::info!(dialect = %connection.dialect(), "Opened link");

        Ok(Self {
            connection,
            associations: Associations::new(),
            options: config.sync.clone(),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.connection.dialect()
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn associations(&self) -> &Associations {
        &self.associations
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Track a schema; it is synchronized on the next `sync()`
    pub fn set_schema(&mut self, schema: LogicalSchema) {
        self.associations.set_schema(schema);
    }

    pub fn remove_schema(&mut self, reference: &str) -> Option<LogicalSchema> {
        self.associations.remove(reference).map(|a| a.schema)
    }

    pub fn get_schema(&self, reference: &str) -> Option<&LogicalSchema> {
        self.associations.get_schema(reference)
    }

    pub fn get_schemas(&self) -> Vec<&LogicalSchema> {
        self.associations.get_schemas()
    }

    pub fn to_dialect_schema(&self, schema: &LogicalSchema) -> LogicalSchema {
        adapt::to_dialect_schema(schema, self.dialect())
    }

    /// Structural signature of a schema as this dialect would store it
    pub fn to_structure(&self, schema: &LogicalSchema) -> StructuralSignature {
        StructuralSignature::of(&self.to_dialect_schema(schema), &self.associations, self.dialect())
    }

    pub fn schema_builder(&self) -> SchemaBuilder {
        SchemaBuilder::new(self.dialect())
    }

    pub fn synchronizer(&self) -> Result<DatabaseSynchronizer> {
        Ok(DatabaseSynchronizer::new(
            DatabaseInspector::for_connection(&self.connection)?,
            Arc::new(self.connection.clone()),
            self.options.clone(),
        ))
    }

    /// Plan the pending associations without executing anything
    pub async fn plan(&self) -> Result<SyncPlan> {
        self.synchronizer()?.plan(&self.associations).await
    }

    pub async fn sync(&mut self) -> Result<SyncReport> {
        let synchronizer = self.synchronizer()?;
        synchronizer.sync(&mut self.associations).await
    }

    pub async fn delete_table(&self, table: &str) -> Result<()> {
        self.synchronizer()?.delete_table(table).await
    }

    pub async fn close(self) {
        self.connection.close().await;
    }
}
