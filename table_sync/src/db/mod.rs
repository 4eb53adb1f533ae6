//! Database module for table_sync
//!
//! This module handles dialects, connections and phased DDL execution.

pub mod connection;
pub mod dialect;
pub mod executor;

// Re-export key types
pub use connection::{DatabaseConnection, StatementRunner};
pub use dialect::Dialect;
pub use executor::PhaseExecutor;
