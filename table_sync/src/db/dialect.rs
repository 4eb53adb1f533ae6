//! SQL dialects supported by the synchronizer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// One supported SQL family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
    MariaDb,
    Sqlite,
}

impl Dialect {
    /// Work out the dialect from a connection string
    ///
    /// `postgres://` and `postgresql://` select Postgres, `mysql://` MySQL,
    /// `mariadb://` MariaDB and any `sqlite:` form (including `sqlite::memory:`)
    /// SQLite.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = match url.split_once(':') {
            Some((scheme, _)) if !scheme.is_empty() => scheme,
            _ => return Err(Error::UnsupportedDialect(url.to_string())),
        };

        match scheme.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(Error::UnsupportedDialect(url.to_string())),
        }
    }

    /// The dialect tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// MySQL and MariaDB share a wire protocol and most of their catalog
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Dialect::MySql | Dialect::MariaDb)
    }

    /// Whether the dialect keeps enums as named catalog types
    pub fn has_enum_types(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether the dialect has an enum column type at all
    pub fn supports_enums(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Whether `DROP COLUMN` works on columns that carry a key or index
    pub fn drops_keyed_columns(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Maximum identifier length in bytes
    pub fn max_identifier_length(&self) -> usize {
        match self {
            Dialect::Postgres => 63,
            Dialect::MySql | Dialect::MariaDb => 64,
            Dialect::Sqlite => 2048,
        }
    }

    /// Quote an identifier for this dialect
    pub fn quote(&self, name: &str) -> String {
        match self {
            Dialect::MySql | Dialect::MariaDb => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    /// Parse a bare dialect tag such as `postgres` or `mariadb`
    fn from_str(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(Error::UnsupportedDialect(tag.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
