//! Utilities for table_sync
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use naming::{derive_reference, enum_type_name, truncate_identifier};
