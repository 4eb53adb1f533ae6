//! Naming utilities for table_sync
//!
//! Constraint, index and synthetic type names generated here must be stable
//! across runs: the reverser strips them again when reading the live schema.

use chrono::{DateTime, Utc};
use inflector::Inflector;

/// Format a name according to a pattern with placeholders
pub fn format_name(pattern: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = pattern.to_string();

    for (placeholder, value) in replacements {
        result = result.replace(&format!("{{{}}}", placeholder), value);
    }

    result
}

/// Name of a single or multi column index
pub fn index_name(table: &str, columns: &[&str]) -> String {
    format_name(
        "{table}_{columns}_index",
        &[("table", table), ("columns", &columns.join("_"))],
    )
}

/// Name of a single column unique constraint
pub fn unique_name(table: &str, column: &str) -> String {
    format_name("{table}_{column}_unique", &[("table", table), ("column", column)])
}

/// Name of a composite constraint declared by a group name
pub fn group_name(table: &str, group: &str) -> String {
    format_name("{table}_{group}", &[("table", table), ("group", group)])
}

/// Name of a foreign key constraint
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format_name("{table}_{column}_foreign", &[("table", table), ("column", column)])
}

/// Name of a primary key constraint
pub fn primary_key_name(table: &str) -> String {
    format_name("{table}_pkey", &[("table", table)])
}

/// Remove the `<table>_` prefix from a live constraint name
pub fn strip_table_prefix<'a>(table: &str, name: &'a str) -> &'a str {
    name.strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
}

/// Re-derive a reference from a live column or table name
pub fn derive_reference(name: &str) -> String {
    name.to_camel_case()
}

/// Synthetic enum type name, independent of value order
pub fn enum_type_name(values: &[String]) -> String {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut context = md5::Context::new();
    for value in sorted {
        context.consume(value.as_bytes());
        context.consume([0u8]);
    }

    format!("enum_{:x}", context.compute())
}

/// Name of the snapshot table taken before columns are dropped
pub fn backup_table_name(table: &str, at: DateTime<Utc>) -> String {
    format!("{}_backup_{}", table, at.format("%Y%m%d%H%M%S"))
}

/// Truncate an identifier to fit database limits
pub fn truncate_identifier(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        return name.to_string();
    }

    // Room for the underscore and an 8 character hash of the full name
    let mut keep_length = max_length.saturating_sub(9);
    while keep_length > 0 && !name.is_char_boundary(keep_length) {
        keep_length -= 1;
    }

    let hash = format!("{:x}", md5::compute(name.as_bytes()));
    format!("{}_{}", &name[..keep_length], &hash[0..8])
}
