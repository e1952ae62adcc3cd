use crate::error::{RdbcError, Result};
use crate::types::{SqlType, SqlValue};

/// Parameter value that keeps its SQL type even when it is NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
    sql_type: SqlType,
    value: Option<SqlValue>,
}

impl SqlParam {
    /// Typed parameter; returns `None` for `SqlValue::Null`, use [`SqlParam::null`] instead.
    pub fn of(value: SqlValue) -> Option<Self> {
        let sql_type = value.sql_type()?;
        Some(Self {
            sql_type,
            value: Some(value),
        })
    }

    pub fn null(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            value: None,
        }
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Result<&SqlValue> {
        self.value
            .as_ref()
            .ok_or_else(|| RdbcError::InvalidState(format!("{} parameter is NULL", self.sql_type)))
    }

    /// Value to send to the engine; `SqlValue::Null` for typed nulls.
    pub fn to_sql_value(&self) -> SqlValue {
        self.value.clone().unwrap_or(SqlValue::Null)
    }
}
