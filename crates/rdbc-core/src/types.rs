use crate::decimal::Decimal;
use crate::numeric::SqlNumeric;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type tag of a [`SqlValue`]; doubles as the native type in column metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    Char,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Numeric,
    String,
    Bytes,
    Uuid,
    Instant,
    LocalDateTime,
    Date,
    Time,
}

impl SqlType {
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Bool => "bool",
            SqlType::Char => "char",
            SqlType::Int16 => "int16",
            SqlType::Int32 => "int32",
            SqlType::Int64 => "int64",
            SqlType::Float32 => "float32",
            SqlType::Float64 => "float64",
            SqlType::Decimal => "decimal",
            SqlType::Numeric => "numeric",
            SqlType::String => "string",
            SqlType::Bytes => "bytes",
            SqlType::Uuid => "uuid",
            SqlType::Instant => "instant",
            SqlType::LocalDateTime => "local_date_time",
            SqlType::Date => "date",
            SqlType::Time => "time",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Char(char),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Numeric(SqlNumeric),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Instant(DateTime<Utc>),
    LocalDateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// `None` for `Null`, which carries no type.
    pub fn sql_type(&self) -> Option<SqlType> {
        let ty = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::Char(_) => SqlType::Char,
            SqlValue::Int16(_) => SqlType::Int16,
            SqlValue::Int32(_) => SqlType::Int32,
            SqlValue::Int64(_) => SqlType::Int64,
            SqlValue::Float32(_) => SqlType::Float32,
            SqlValue::Float64(_) => SqlType::Float64,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::Numeric(_) => SqlType::Numeric,
            SqlValue::String(_) => SqlType::String,
            SqlValue::Bytes(_) => SqlType::Bytes,
            SqlValue::Uuid(_) => SqlType::Uuid,
            SqlValue::Instant(_) => SqlType::Instant,
            SqlValue::LocalDateTime(_) => SqlType::LocalDateTime,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
        };
        Some(ty)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Char(v) => write!(f, "{v}"),
            SqlValue::Int16(v) => write!(f, "{v}"),
            SqlValue::Int32(v) => write!(f, "{v}"),
            SqlValue::Int64(v) => write!(f, "{v}"),
            SqlValue::Float32(v) => write!(f, "{v}"),
            SqlValue::Float64(v) => write!(f, "{v}"),
            SqlValue::Decimal(v) => write!(f, "{v}"),
            SqlValue::Numeric(v) => write!(f, "{v}"),
            SqlValue::String(v) => f.write_str(v),
            SqlValue::Bytes(v) => {
                f.write_str("\\x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            SqlValue::Uuid(v) => write!(f, "{v}"),
            SqlValue::Instant(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::LocalDateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            SqlValue::Date(v) => write!(f, "{v}"),
            SqlValue::Time(v) => write!(f, "{v}"),
        }
    }
}
