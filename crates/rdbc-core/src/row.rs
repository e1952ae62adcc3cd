use crate::convert::TypeConverterRegistry;
use crate::decimal::Decimal;
use crate::error::{RdbcError, Result};
use crate::numeric::SqlNumeric;
use crate::types::{SqlType, SqlValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Vendor-specific type identifier, e.g. `INT8`.
    pub db_type_id: String,
    pub native_type: Option<SqlType>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, db_type_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type_id: db_type_id.into(),
            native_type: None,
        }
    }

    pub fn with_native_type(mut self, native_type: SqlType) -> Self {
        self.native_type = Some(native_type);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMetadata {
    pub columns: Vec<ColumnMetadata>,
}

impl RowMetadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub code: String,
}

impl Warning {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Column address accepted by [`Row`] accessors: a 0-based index or a name.
pub trait ColumnIndex: fmt::Display {
    fn resolve(&self, metadata: &RowMetadata) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, metadata: &RowMetadata) -> Result<usize> {
        if *self < metadata.len() {
            Ok(*self)
        } else {
            Err(RdbcError::NoSuchColumn(format!("index {self}")))
        }
    }
}

impl ColumnIndex for str {
    fn resolve(&self, metadata: &RowMetadata) -> Result<usize> {
        metadata
            .index_of(self)
            .ok_or_else(|| RdbcError::NoSuchColumn(self.to_string()))
    }
}

impl ColumnIndex for String {
    fn resolve(&self, metadata: &RowMetadata) -> Result<usize> {
        self.as_str().resolve(metadata)
    }
}

/// A returned row. Immutable, holds no database resources.
#[derive(Clone)]
pub struct Row {
    metadata: Arc<RowMetadata>,
    values: Vec<SqlValue>,
    registry: Arc<TypeConverterRegistry>,
}

impl Row {
    pub fn new(
        metadata: Arc<RowMetadata>,
        values: Vec<SqlValue>,
        registry: Arc<TypeConverterRegistry>,
    ) -> Self {
        Self {
            metadata,
            values,
            registry,
        }
    }

    pub fn metadata(&self) -> &RowMetadata {
        &self.metadata
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value, `SqlValue::Null` included.
    pub fn value(&self, column: impl ColumnIndex) -> Result<&SqlValue> {
        let idx = column.resolve(&self.metadata)?;
        self.values
            .get(idx)
            .ok_or_else(|| RdbcError::NoSuchColumn(column.to_string()))
    }

    /// Converts the column to `T`; NULL fails with `Conversion`.
    pub fn get<T: 'static>(&self, column: impl ColumnIndex) -> Result<T> {
        let value = self.value(&column)?;
        if value.is_null() {
            return Err(RdbcError::Conversion(format!(
                "column {column} is NULL, use an optional accessor"
            )));
        }
        self.registry.convert(value)
    }

    /// Converts the column to `T`; NULL yields `None`.
    pub fn get_opt<T: 'static>(&self, column: impl ColumnIndex) -> Result<Option<T>> {
        let value = self.value(&column)?;
        if value.is_null() {
            return Ok(None);
        }
        self.registry.convert(value).map(Some)
    }

    pub fn get_str(&self, column: impl ColumnIndex) -> Result<String> {
        self.get(column)
    }

    pub fn get_str_opt(&self, column: impl ColumnIndex) -> Result<Option<String>> {
        self.get_opt(column)
    }

    pub fn get_bool(&self, column: impl ColumnIndex) -> Result<bool> {
        self.get(column)
    }

    pub fn get_bool_opt(&self, column: impl ColumnIndex) -> Result<Option<bool>> {
        self.get_opt(column)
    }

    pub fn get_char(&self, column: impl ColumnIndex) -> Result<char> {
        self.get(column)
    }

    pub fn get_char_opt(&self, column: impl ColumnIndex) -> Result<Option<char>> {
        self.get_opt(column)
    }

    pub fn get_i16(&self, column: impl ColumnIndex) -> Result<i16> {
        self.get(column)
    }

    pub fn get_i16_opt(&self, column: impl ColumnIndex) -> Result<Option<i16>> {
        self.get_opt(column)
    }

    pub fn get_i32(&self, column: impl ColumnIndex) -> Result<i32> {
        self.get(column)
    }

    pub fn get_i32_opt(&self, column: impl ColumnIndex) -> Result<Option<i32>> {
        self.get_opt(column)
    }

    pub fn get_i64(&self, column: impl ColumnIndex) -> Result<i64> {
        self.get(column)
    }

    pub fn get_i64_opt(&self, column: impl ColumnIndex) -> Result<Option<i64>> {
        self.get_opt(column)
    }

    pub fn get_decimal(&self, column: impl ColumnIndex) -> Result<Decimal> {
        self.get(column)
    }

    pub fn get_decimal_opt(&self, column: impl ColumnIndex) -> Result<Option<Decimal>> {
        self.get_opt(column)
    }

    pub fn get_numeric(&self, column: impl ColumnIndex) -> Result<SqlNumeric> {
        self.get(column)
    }

    pub fn get_numeric_opt(&self, column: impl ColumnIndex) -> Result<Option<SqlNumeric>> {
        self.get_opt(column)
    }

    pub fn get_f32(&self, column: impl ColumnIndex) -> Result<f32> {
        self.get(column)
    }

    pub fn get_f32_opt(&self, column: impl ColumnIndex) -> Result<Option<f32>> {
        self.get_opt(column)
    }

    pub fn get_f64(&self, column: impl ColumnIndex) -> Result<f64> {
        self.get(column)
    }

    pub fn get_f64_opt(&self, column: impl ColumnIndex) -> Result<Option<f64>> {
        self.get_opt(column)
    }

    pub fn get_instant(&self, column: impl ColumnIndex) -> Result<DateTime<Utc>> {
        self.get(column)
    }

    pub fn get_instant_opt(&self, column: impl ColumnIndex) -> Result<Option<DateTime<Utc>>> {
        self.get_opt(column)
    }

    pub fn get_local_date_time(&self, column: impl ColumnIndex) -> Result<NaiveDateTime> {
        self.get(column)
    }

    pub fn get_local_date_time_opt(
        &self,
        column: impl ColumnIndex,
    ) -> Result<Option<NaiveDateTime>> {
        self.get_opt(column)
    }

    pub fn get_date(&self, column: impl ColumnIndex) -> Result<NaiveDate> {
        self.get(column)
    }

    pub fn get_date_opt(&self, column: impl ColumnIndex) -> Result<Option<NaiveDate>> {
        self.get_opt(column)
    }

    pub fn get_time(&self, column: impl ColumnIndex) -> Result<NaiveTime> {
        self.get(column)
    }

    pub fn get_time_opt(&self, column: impl ColumnIndex) -> Result<Option<NaiveTime>> {
        self.get_opt(column)
    }

    pub fn get_bytes(&self, column: impl ColumnIndex) -> Result<Vec<u8>> {
        self.get(column)
    }

    pub fn get_bytes_opt(&self, column: impl ColumnIndex) -> Result<Option<Vec<u8>>> {
        self.get_opt(column)
    }

    pub fn get_uuid(&self, column: impl ColumnIndex) -> Result<Uuid> {
        self.get(column)
    }

    pub fn get_uuid_opt(&self, column: impl ColumnIndex) -> Result<Option<Uuid>> {
        self.get_opt(column)
    }
}

impl<C: ColumnIndex + ?Sized> ColumnIndex for &C {
    fn resolve(&self, metadata: &RowMetadata) -> Result<usize> {
        (**self).resolve(metadata)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (column, value) in self.metadata.columns.iter().zip(&self.values) {
            map.entry(&column.name, value);
        }
        map.finish()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.values == other.values
    }
}

/// Fully buffered statement result. Everything is pulled into memory, so it
/// is unsuitable for unbounded results; use a `ResultStream` for those.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub rows_affected: u64,
    pub warnings: Vec<Warning>,
    pub metadata: Arc<RowMetadata>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
