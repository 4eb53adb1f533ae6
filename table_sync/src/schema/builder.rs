//! DDL statement builder
//!
//! Renders column instructions and table operations into SQL for one dialect.
//! Every operation returns the statements to run in order; an empty list means
//! the dialect has nothing to do for it (SQLite declares primary and foreign
//! keys inside `CREATE TABLE`, so the later `ALTER` forms are empty there).

use crate::db::dialect::Dialect;
use crate::schema::type_mapper::{ColumnKind, ColumnSpec, DefaultValue};
use crate::utils::naming;

/// Foreign key to declare on a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Everything `CREATE TABLE` needs
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeySpec>,
}

/// Per-dialect DDL renderer
#[derive(Debug, Clone, Copy)]
pub struct SchemaBuilder {
    dialect: Dialect,
}

impl SchemaBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote(name)
    }

    fn quote_list(&self, names: &[String]) -> String {
        names.iter().map(|n| self.quote(n)).collect::<Vec<_>>().join(", ")
    }

    /// Quote a string literal
    pub fn literal(&self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        if self.dialect.is_mysql_family() {
            format!("'{}'", escaped.replace('\\', "\\\\"))
        } else {
            format!("'{}'", escaped)
        }
    }

    /// Generate the statements creating a table
    pub fn create_table(&self, table: &TableDefinition) -> Vec<String> {
        let mut statements = Vec::new();

        if self.dialect == Dialect::Postgres {
            let mut declared: Vec<&str> = Vec::new();
            for column in &table.columns {
                if let ColumnKind::Enum {
                    type_name,
                    values,
                    existing: false,
                } = &column.kind
                {
                    if !declared.contains(&type_name.as_str()) {
                        declared.push(type_name);
                        statements.push(self.create_enum_type(type_name, values));
                    }
                }
            }
        }

        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|column| format!("  {}", self.column_definition(column)))
            .collect();

        if self.dialect == Dialect::Sqlite {
            if !table.primary_key.is_empty() {
                definitions.push(format!("  PRIMARY KEY ({})", self.quote_list(&table.primary_key)));
            }
            for fk in &table.foreign_keys {
                definitions.push(format!(
                    "  CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.quote(&fk.name),
                    self.quote(&fk.column),
                    self.quote(&fk.ref_table),
                    self.quote(&fk.ref_column)
                ));
            }
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote(&table.name),
            definitions.join(",\n")
        );
        if self.dialect.is_mysql_family() {
            sql.push_str(" DEFAULT CHARACTER SET=utf8mb4 COLLATE=utf8mb4_unicode_ci");
        }
        statements.push(sql);

        statements
    }

    /// Declare a named enum type, tolerating a concurrent or leftover duplicate
    fn create_enum_type(&self, type_name: &str, values: &[String]) -> String {
        let values = values.iter().map(|v| self.literal(v)).collect::<Vec<_>>().join(", ");
        format!(
            "DO $$ BEGIN CREATE TYPE {} AS ENUM ({}); \
             EXCEPTION WHEN duplicate_object OR unique_violation THEN NULL; END $$",
            self.quote(type_name),
            values
        )
    }

    /// Render one column definition
    pub fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut sql = format!("{} {}", self.quote(&column.name), self.column_type(column));

        if let (Dialect::Sqlite, ColumnKind::Enum { values, .. }) = (self.dialect, &column.kind) {
            let values = values.iter().map(|v| self.literal(v)).collect::<Vec<_>>().join(", ");
            sql.push_str(&format!(" CHECK ({} IN ({}))", self.quote(&column.name), values));
        }

        if let Some(default) = &column.default {
            sql.push_str(&format!(" DEFAULT {}", self.default_expression(column, default)));
        }

        if column.nullable {
            if self.dialect != Dialect::Sqlite {
                sql.push_str(" NULL");
            }
        } else {
            sql.push_str(" NOT NULL");
        }

        sql
    }

    /// Render the column type, including the unsigned modifier
    pub fn column_type(&self, column: &ColumnSpec) -> String {
        let base = match (&column.kind, self.dialect) {
            (ColumnKind::Boolean, Dialect::MySql | Dialect::MariaDb) => "tinyint(1)".to_string(),
            (ColumnKind::Boolean, _) => "boolean".to_string(),
            (ColumnKind::SmallInteger, _) => "smallint".to_string(),
            (ColumnKind::Integer, Dialect::MySql | Dialect::MariaDb) => "int".to_string(),
            (ColumnKind::Integer, _) => "integer".to_string(),
            (ColumnKind::BigInteger, _) => "bigint".to_string(),
            (ColumnKind::Float, Dialect::Postgres) => "real".to_string(),
            (ColumnKind::Float, _) => "float".to_string(),
            (ColumnKind::Double, Dialect::Postgres) => "double precision".to_string(),
            (ColumnKind::Double, _) => "double".to_string(),
            (ColumnKind::Decimal { precision, scale }, _) => format!("decimal({}, {})", precision, scale),
            (ColumnKind::String { length }, _) => format!("varchar({})", length),
            (ColumnKind::Text, _) => "text".to_string(),
            (ColumnKind::Uuid, Dialect::Postgres) => "uuid".to_string(),
            (ColumnKind::Uuid, _) => "char(36)".to_string(),
            (ColumnKind::Date, _) => "date".to_string(),
            (ColumnKind::Time, _) => "time".to_string(),
            (ColumnKind::DateTime, Dialect::Postgres) => "timestamp without time zone".to_string(),
            (ColumnKind::DateTime, _) => "datetime".to_string(),
            (ColumnKind::Timestamp, Dialect::Postgres) => "timestamp with time zone".to_string(),
            (ColumnKind::Timestamp, _) => "timestamp".to_string(),
            (ColumnKind::Json, Dialect::Postgres) => "jsonb".to_string(),
            (ColumnKind::Json, _) => "json".to_string(),
            (ColumnKind::Binary, Dialect::Postgres) => "bytea".to_string(),
            (ColumnKind::Binary, _) => "blob".to_string(),
            (ColumnKind::Enum { type_name, .. }, Dialect::Postgres) => self.quote(type_name),
            (ColumnKind::Enum { values, .. }, Dialect::MySql | Dialect::MariaDb) => format!(
                "enum({})",
                values.iter().map(|v| self.literal(v)).collect::<Vec<_>>().join(",")
            ),
            (ColumnKind::Enum { .. }, Dialect::Sqlite) => "text".to_string(),
        };

        if column.unsigned && self.dialect.is_mysql_family() {
            format!("{} unsigned", base)
        } else {
            base
        }
    }

    fn default_expression(&self, column: &ColumnSpec, default: &DefaultValue) -> String {
        let expression = match default {
            DefaultValue::Null => return "NULL".to_string(),
            DefaultValue::Boolean(value) => match self.dialect {
                Dialect::Postgres => value.to_string(),
                _ => if *value { "1" } else { "0" }.to_string(),
            },
            DefaultValue::Number(value) => value.to_string(),
            DefaultValue::String(value) => self.literal(value),
        };

        // MySQL only accepts expression defaults on blob-like columns
        let blob_like = matches!(column.kind, ColumnKind::Text | ColumnKind::Json | ColumnKind::Binary);
        if self.dialect == Dialect::MySql && blob_like {
            format!("({})", expression)
        } else {
            expression
        }
    }

    /// Generate SQL adding a primary key over the given columns
    pub fn add_primary_key(&self, table: &str, columns: &[String]) -> Vec<String> {
        if columns.is_empty() {
            return Vec::new();
        }

        match self.dialect {
            Dialect::Postgres => vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.quote(table),
                self.quote(&naming::primary_key_name(table)),
                self.quote_list(columns)
            )],
            Dialect::MySql | Dialect::MariaDb => vec![format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                self.quote(table),
                self.quote_list(columns)
            )],
            Dialect::Sqlite => Vec::new(),
        }
    }

    /// Generate SQL adding a unique constraint
    pub fn add_unique(&self, table: &str, name: &str, columns: &[String]) -> String {
        match self.dialect {
            Dialect::Postgres => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                self.quote(table),
                self.quote(name),
                self.quote_list(columns)
            ),
            Dialect::MySql | Dialect::MariaDb => format!(
                "ALTER TABLE {} ADD UNIQUE KEY {} ({})",
                self.quote(table),
                self.quote(name),
                self.quote_list(columns)
            ),
            Dialect::Sqlite => format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                self.quote(name),
                self.quote(table),
                self.quote_list(columns)
            ),
        }
    }

    /// Generate SQL creating a plain index
    pub fn add_index(&self, table: &str, name: &str, columns: &[String]) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote(name),
            self.quote(table),
            self.quote_list(columns)
        )
    }

    /// Generate SQL adding a foreign key to an existing table
    pub fn add_foreign_key(&self, table: &str, fk: &ForeignKeySpec) -> Vec<String> {
        match self.dialect {
            Dialect::Postgres | Dialect::MySql | Dialect::MariaDb => vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote(table),
                self.quote(&fk.name),
                self.quote(&fk.column),
                self.quote(&fk.ref_table),
                self.quote(&fk.ref_column)
            )],
            Dialect::Sqlite => Vec::new(),
        }
    }

    /// Generate SQL dropping a foreign key constraint
    pub fn drop_foreign_key(&self, table: &str, name: &str) -> Vec<String> {
        match self.dialect {
            Dialect::Postgres => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                self.quote(table),
                self.quote(name)
            )],
            Dialect::MySql | Dialect::MariaDb => vec![format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                self.quote(table),
                self.quote(name)
            )],
            Dialect::Sqlite => Vec::new(),
        }
    }

    /// Generate SQL dropping a column
    pub fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    /// Generate SQL to drop a table
    pub fn drop_table_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    /// Generate SQL creating an empty copy of a table's columns
    pub fn create_backup(&self, table: &str, backup: &str) -> String {
        format!(
            "CREATE TABLE {} AS SELECT * FROM {} WHERE 1 = 0",
            self.quote(backup),
            self.quote(table)
        )
    }

    /// Generate SQL copying every row of a table into its backup
    pub fn copy_into_backup(&self, table: &str, backup: &str) -> String {
        format!(
            "INSERT INTO {} SELECT * FROM {}",
            self.quote(backup),
            self.quote(table)
        )
    }
}
