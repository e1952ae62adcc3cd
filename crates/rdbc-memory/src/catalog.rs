use rdbc_core::{RdbcError, Result, SqlType, SqlValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type Version = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type as written, upper-cased, e.g. `VARCHAR(20)`.
    pub db_type: String,
    pub sql_type: SqlType,
    pub not_null: bool,
    pub serial: bool,
    pub default: Option<SqlValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<usize>,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<UniqueConstraint>,
}

impl TableSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<(usize, &ColumnDef)> {
        self.column_index(name)
            .map(|idx| (idx, &self.columns[idx]))
            .ok_or_else(|| {
                RdbcError::InvalidQuery(format!(
                    "column \"{name}\" of relation \"{}\" does not exist",
                    self.name
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub schema: TableSchema,
    pub rows: Vec<Vec<SqlValue>>,
    serials: HashMap<usize, i64>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            serials: HashMap::new(),
        }
    }

    /// Next value of the sequence behind a SERIAL column, starting at 1.
    pub fn next_serial(&mut self, column: usize) -> i64 {
        let current = self.serials.entry(column).or_insert(0);
        *current += 1;
        *current
    }

    /// Checks NOT NULL for the `changed` rows and every unique constraint
    /// between the changed rows and the rest of the table.
    pub fn check_constraints(&self, changed: &[usize]) -> Result<()> {
        for &idx in changed {
            let row = &self.rows[idx];
            for (column, value) in self.schema.columns.iter().zip(row) {
                if column.not_null && value.is_null() {
                    return Err(RdbcError::ConstraintViolation {
                        constraint: format!("{}_{}_not_null", self.schema.name, column.name),
                        message: format!(
                            "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                            column.name, self.schema.name
                        ),
                    });
                }
            }
        }
        for constraint in &self.schema.constraints {
            for &idx in changed {
                let key: Vec<&SqlValue> = constraint.columns.iter().map(|&c| &self.rows[idx][c]).collect();
                // NULLs never collide
                if key.iter().any(|v| v.is_null()) {
                    continue;
                }
                let duplicate = self.rows.iter().enumerate().any(|(other, row)| {
                    other != idx && constraint.columns.iter().zip(&key).all(|(&c, v)| row[c] == **v)
                });
                if duplicate {
                    return Err(RdbcError::ConstraintViolation {
                        constraint: constraint.name.clone(),
                        message: format!(
                            "duplicate key value violates unique constraint \"{}\"",
                            constraint.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// All tables of a database plus a version bumped by every change.
#[derive(Debug, Clone, Default)]
pub struct Store {
    tables: HashMap<String, Table>,
    version: Version,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn next_version(&mut self) -> Version {
        self.version += 1;
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        if self.tables.contains_key(&schema.name) {
            return Err(RdbcError::InvalidQuery(format!(
                "relation \"{}\" already exists",
                schema.name
            )));
        }
        self.tables.insert(schema.name.clone(), Table::new(schema));
        self.next_version();
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables
            .remove(name)
            .ok_or_else(|| missing_table(name))?;
        self.next_version();
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| missing_table(name))
    }

    /// Swaps in a modified copy of a table.
    pub fn replace_table(&mut self, table: Table) {
        self.tables.insert(table.schema.name.clone(), table);
        self.next_version();
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Named store shared by every connection of a factory.
#[derive(Debug)]
pub struct Database {
    name: String,
    store: Mutex<Store>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Mutex::new(Store::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing_table(name: &str) -> RdbcError {
    RdbcError::InvalidQuery(format!("relation \"{name}\" does not exist"))
}

/// Maps a declared column type to its native type; the flag marks SERIAL
/// pseudo-types.
pub fn parse_column_type(declared: &str) -> Result<(SqlType, bool)> {
    let upper = declared.to_ascii_uppercase();
    let base = strip_modifiers(&upper);
    let length_one = upper.contains("(1)");
    let parsed = match base.as_str() {
        "BOOL" | "BOOLEAN" => (SqlType::Bool, false),
        "CHAR" | "CHARACTER" if length_one || !upper.contains('(') => (SqlType::Char, false),
        "CHAR" | "CHARACTER" | "BPCHAR" => (SqlType::String, false),
        "SMALLINT" | "INT2" => (SqlType::Int16, false),
        "SMALLSERIAL" | "SERIAL2" => (SqlType::Int16, true),
        "INT" | "INTEGER" | "INT4" => (SqlType::Int32, false),
        "SERIAL" | "SERIAL4" => (SqlType::Int32, true),
        "BIGINT" | "INT8" => (SqlType::Int64, false),
        "BIGSERIAL" | "SERIAL8" => (SqlType::Int64, true),
        "REAL" | "FLOAT4" => (SqlType::Float32, false),
        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" | "FLOAT8" => (SqlType::Float64, false),
        "DECIMAL" | "DEC" => (SqlType::Decimal, false),
        "NUMERIC" => (SqlType::Numeric, false),
        "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "STRING" => (SqlType::String, false),
        "BYTEA" | "BLOB" | "BINARY" | "VARBINARY" => (SqlType::Bytes, false),
        "UUID" => (SqlType::Uuid, false),
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => (SqlType::Instant, false),
        "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "DATETIME" => {
            (SqlType::LocalDateTime, false)
        }
        "DATE" => (SqlType::Date, false),
        "TIME" | "TIME WITHOUT TIME ZONE" => (SqlType::Time, false),
        _ => {
            return Err(RdbcError::InvalidQuery(format!(
                "type \"{declared}\" is not supported"
            )))
        }
    };
    Ok(parsed)
}

/// Vendor type id reported for computed columns.
pub fn type_name(sql_type: SqlType) -> &'static str {
    match sql_type {
        SqlType::Bool => "BOOL",
        SqlType::Char => "CHAR",
        SqlType::Int16 => "INT2",
        SqlType::Int32 => "INT4",
        SqlType::Int64 => "INT8",
        SqlType::Float32 => "FLOAT4",
        SqlType::Float64 => "FLOAT8",
        SqlType::Decimal => "DECIMAL",
        SqlType::Numeric => "NUMERIC",
        SqlType::String => "TEXT",
        SqlType::Bytes => "BYTEA",
        SqlType::Uuid => "UUID",
        SqlType::Instant => "TIMESTAMPTZ",
        SqlType::LocalDateTime => "TIMESTAMP",
        SqlType::Date => "DATE",
        SqlType::Time => "TIME",
    }
}

/// Drops `(..)` modifiers and collapses whitespace: `TIMESTAMP(3) WITH TIME ZONE`
/// becomes `TIMESTAMP WITH TIME ZONE`.
fn strip_modifiers(declared: &str) -> String {
    let mut out = String::with_capacity(declared.len());
    let mut depth = 0usize;
    for c in declared.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::parse_column_type;
    use rdbc_core::SqlType;

    #[test]
    fn declared_types_map_to_native_types() {
        assert_eq!(parse_column_type("bigserial").expect("type"), (SqlType::Int64, true));
        assert_eq!(parse_column_type("VARCHAR(20)").expect("type"), (SqlType::String, false));
        assert_eq!(parse_column_type("CHAR(1)").expect("type"), (SqlType::Char, false));
        assert_eq!(parse_column_type("CHAR(8)").expect("type"), (SqlType::String, false));
        assert_eq!(
            parse_column_type("TIMESTAMP(3) WITH TIME ZONE").expect("type"),
            (SqlType::Instant, false)
        );
        assert_eq!(parse_column_type("NUMERIC(10,2)").expect("type"), (SqlType::Numeric, false));
        assert!(parse_column_type("GEOMETRY").is_err());
    }
}
