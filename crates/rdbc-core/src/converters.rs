//! Standard converters, one per [`SqlType`].
//!
//! Numeric conversions follow C-like semantics: decimals and floats are
//! truncated toward zero and integer narrowing wraps.

use crate::convert::{Converter, TypeConverterRegistry};
use crate::decimal::Decimal;
use crate::error::{RdbcError, Result};
use crate::numeric::SqlNumeric;
use crate::types::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

pub(crate) fn register_standard(registry: &mut TypeConverterRegistry) {
    registry.register_or_replace(BoolConverter);
    registry.register_or_replace(CharConverter);
    registry.register_or_replace(ShortConverter);
    registry.register_or_replace(IntConverter);
    registry.register_or_replace(LongConverter);
    registry.register_or_replace(FloatConverter);
    registry.register_or_replace(DoubleConverter);
    registry.register_or_replace(DecimalConverter);
    registry.register_or_replace(NumericConverter);
    registry.register_or_replace(StringConverter);
    registry.register_or_replace(BytesConverter);
    registry.register_or_replace(UuidConverter);
    registry.register_or_replace(InstantConverter);
    registry.register_or_replace(LocalDateTimeConverter);
    registry.register_or_replace(DateConverter);
    registry.register_or_replace(TimeConverter);
}

fn integer(value: &SqlValue, target: &str) -> Result<i64> {
    match value {
        SqlValue::Int16(v) => Ok(*v as i64),
        SqlValue::Int32(v) => Ok(*v as i64),
        SqlValue::Int64(v) => Ok(*v),
        SqlValue::Float32(v) if v.is_finite() => Ok(*v as i64),
        SqlValue::Float64(v) if v.is_finite() => Ok(*v as i64),
        SqlValue::Decimal(d) => Ok(d.trunc() as i64),
        SqlValue::Numeric(SqlNumeric::Finite(d)) => Ok(d.trunc() as i64),
        SqlValue::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.parse::<Decimal>().map(|d| d.trunc() as i64))
            .map_err(|_| RdbcError::conversion(value, target)),
        other => Err(RdbcError::conversion(other, target)),
    }
}

fn float(value: &SqlValue, target: &str) -> Result<f64> {
    match value {
        SqlValue::Int16(v) => Ok(*v as f64),
        SqlValue::Int32(v) => Ok(*v as f64),
        SqlValue::Int64(v) => Ok(*v as f64),
        SqlValue::Float32(v) => Ok(*v as f64),
        SqlValue::Float64(v) => Ok(*v),
        SqlValue::Decimal(d) => Ok(d.to_f64()),
        SqlValue::Numeric(n) => Ok(n.to_f64()),
        SqlValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| RdbcError::conversion(value, target)),
        other => Err(RdbcError::conversion(other, target)),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter;

impl Converter for BoolConverter {
    type Target = bool;

    fn convert(&self, value: &SqlValue) -> Result<bool> {
        let from_text = |s: &str| match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "y" | "yes" | "1" => Some(true),
            "false" | "f" | "n" | "no" | "0" => Some(false),
            _ => None,
        };
        match value {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Char(c) => from_text(&c.to_string()),
            SqlValue::String(s) => from_text(s),
            SqlValue::Int16(_) | SqlValue::Int32(_) | SqlValue::Int64(_) => {
                match integer(value, "bool")? {
                    1 => Some(true),
                    0 => Some(false),
                    _ => None,
                }
            }
            _ => None,
        }
        .ok_or_else(|| RdbcError::conversion(value, "bool"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CharConverter;

impl Converter for CharConverter {
    type Target = char;

    fn convert(&self, value: &SqlValue) -> Result<char> {
        match value {
            SqlValue::Char(c) => Ok(*c),
            SqlValue::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(RdbcError::Conversion(format!(
                        "string '{s}' is not a single character"
                    ))),
                }
            }
            other => Err(RdbcError::conversion(other, "char")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShortConverter;

impl Converter for ShortConverter {
    type Target = i16;

    fn convert(&self, value: &SqlValue) -> Result<i16> {
        match value {
            SqlValue::Int16(v) => Ok(*v),
            other => integer(other, "i16").map(|v| v as i16),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntConverter;

impl Converter for IntConverter {
    type Target = i32;

    fn convert(&self, value: &SqlValue) -> Result<i32> {
        match value {
            SqlValue::Int32(v) => Ok(*v),
            other => integer(other, "i32").map(|v| v as i32),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LongConverter;

impl Converter for LongConverter {
    type Target = i64;

    fn convert(&self, value: &SqlValue) -> Result<i64> {
        integer(value, "i64")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatConverter;

impl Converter for FloatConverter {
    type Target = f32;

    fn convert(&self, value: &SqlValue) -> Result<f32> {
        match value {
            SqlValue::Float32(v) => Ok(*v),
            other => float(other, "f32").map(|v| v as f32),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleConverter;

impl Converter for DoubleConverter {
    type Target = f64;

    fn convert(&self, value: &SqlValue) -> Result<f64> {
        float(value, "f64")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalConverter;

impl Converter for DecimalConverter {
    type Target = Decimal;

    fn convert(&self, value: &SqlValue) -> Result<Decimal> {
        match value {
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::Numeric(SqlNumeric::Finite(d)) => Ok(*d),
            SqlValue::Int16(v) => Ok(Decimal::from(*v)),
            SqlValue::Int32(v) => Ok(Decimal::from(*v)),
            SqlValue::Int64(v) => Ok(Decimal::from(*v)),
            SqlValue::Float32(v) => Decimal::from_f64(*v as f64)
                .ok_or_else(|| RdbcError::conversion(value, "decimal")),
            SqlValue::Float64(v) => {
                Decimal::from_f64(*v).ok_or_else(|| RdbcError::conversion(value, "decimal"))
            }
            SqlValue::String(s) => s
                .parse::<Decimal>()
                .map_err(|_| RdbcError::conversion(value, "decimal")),
            other => Err(RdbcError::conversion(other, "decimal")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumericConverter;

impl Converter for NumericConverter {
    type Target = SqlNumeric;

    fn convert(&self, value: &SqlValue) -> Result<SqlNumeric> {
        match value {
            SqlValue::Numeric(n) => Ok(*n),
            SqlValue::Float32(v) => SqlNumeric::from_f64(*v as f64),
            SqlValue::Float64(v) => SqlNumeric::from_f64(*v),
            SqlValue::String(s) => s.parse::<SqlNumeric>(),
            other => DecimalConverter.convert(other).map(SqlNumeric::Finite),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter for StringConverter {
    type Target = String;

    fn convert(&self, value: &SqlValue) -> Result<String> {
        match value {
            SqlValue::String(s) => Ok(s.clone()),
            SqlValue::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|_| RdbcError::Conversion("bytes are not valid UTF-8".into())),
            SqlValue::Null => Err(RdbcError::conversion(value, "string")),
            other => Ok(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesConverter;

impl Converter for BytesConverter {
    type Target = Vec<u8>;

    fn convert(&self, value: &SqlValue) -> Result<Vec<u8>> {
        match value {
            SqlValue::Bytes(b) => Ok(b.clone()),
            SqlValue::Uuid(u) => Ok(u.as_bytes().to_vec()),
            other => Err(RdbcError::conversion(other, "bytes")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidConverter;

impl Converter for UuidConverter {
    type Target = Uuid;

    fn convert(&self, value: &SqlValue) -> Result<Uuid> {
        match value {
            SqlValue::Uuid(u) => Ok(*u),
            // canonical 8-4-4-4-12 form only
            SqlValue::String(s) if s.len() == 36 => {
                Uuid::parse_str(s).map_err(|e| RdbcError::Conversion(e.to_string()))
            }
            SqlValue::Bytes(b) => {
                Uuid::from_slice(b).map_err(|e| RdbcError::Conversion(e.to_string()))
            }
            other => Err(RdbcError::conversion(other, "uuid")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstantConverter;

impl Converter for InstantConverter {
    type Target = DateTime<Utc>;

    fn convert(&self, value: &SqlValue) -> Result<DateTime<Utc>> {
        match value {
            SqlValue::Instant(t) => Ok(*t),
            SqlValue::LocalDateTime(t) => Ok(t.and_utc()),
            SqlValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| RdbcError::Conversion(e.to_string())),
            other => Err(RdbcError::conversion(other, "instant")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDateTimeConverter;

impl Converter for LocalDateTimeConverter {
    type Target = NaiveDateTime;

    fn convert(&self, value: &SqlValue) -> Result<NaiveDateTime> {
        match value {
            SqlValue::LocalDateTime(t) => Ok(*t),
            SqlValue::Instant(t) => Ok(t.naive_utc()),
            SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            SqlValue::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|e| RdbcError::Conversion(e.to_string())),
            other => Err(RdbcError::conversion(other, "local date-time")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateConverter;

impl Converter for DateConverter {
    type Target = NaiveDate;

    fn convert(&self, value: &SqlValue) -> Result<NaiveDate> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::LocalDateTime(t) => Ok(t.date()),
            SqlValue::Instant(t) => Ok(t.date_naive()),
            SqlValue::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| RdbcError::Conversion(e.to_string())),
            other => Err(RdbcError::conversion(other, "date")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeConverter;

impl Converter for TimeConverter {
    type Target = NaiveTime;

    fn convert(&self, value: &SqlValue) -> Result<NaiveTime> {
        match value {
            SqlValue::Time(t) => Ok(*t),
            SqlValue::LocalDateTime(t) => Ok(t.time()),
            SqlValue::Instant(t) => Ok(t.time()),
            SqlValue::String(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .map_err(|e| RdbcError::Conversion(e.to_string())),
            other => Err(RdbcError::conversion(other, "time")),
        }
    }
}
