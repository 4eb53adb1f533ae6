//! Error types for table_sync

use thiserror::Error;

/// Result type for table_sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for table_sync
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Unknown column type: {0}")]
    UnknownColumnType(String),

    #[error("Unhandled alteration of table `{table}`: {}", changes.join("; "))]
    UnhandledAlteration { table: String, changes: Vec<String> },

    #[error("Unsupported relation on table `{table}`: {reason}")]
    UnsupportedRelation { table: String, reason: String },

    #[error("Invalid relation on table `{table}`: {reason}")]
    InvalidRelation { table: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Logging error: {0}")]
    LoggingError(String),
}

impl Error {
    /// Whether this error is an alteration the planner refused to apply
    pub fn is_unhandled_alteration(&self) -> bool {
        matches!(self, Error::UnhandledAlteration { .. })
    }
}

/// Convert Serde JSON errors to table_sync errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to table_sync errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
