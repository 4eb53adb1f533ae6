//! Schema module for table_sync
//!
//! This module holds the canonical schema model, type mapping, introspection,
//! reverse engineering, diffing and DDL generation.

pub mod adapt;
pub mod builder;
pub mod inspector;
pub mod planner;
pub mod reverser;
pub mod signature;
pub mod type_mapper;
pub mod types;

// Re-export key types
pub use adapt::to_dialect_schema;
pub use builder::SchemaBuilder;
pub use inspector::{DatabaseInspector, DialectInspector};
pub use planner::{ChangePlanner, ChangeStep, Phase};
pub use reverser::SchemaReverser;
pub use signature::StructuralSignature;
pub use type_mapper::TypeMapper;
pub use types::{
    Association, Associations, Field, FieldTag, FieldType, Index, LogicalSchema, Relation,
    RelationKind, RelationTarget, SchemaCatalog, TypeParams, UniqueGroup,
};
