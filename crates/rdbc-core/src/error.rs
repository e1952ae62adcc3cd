use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RdbcError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RdbcError {
    #[error("connect error: {0}")]
    Connect(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("current transaction is inactive, roll it back before issuing further statements")]
    InactiveTransaction,
    #[error("constraint {constraint} violated: {message}")]
    ConstraintViolation { constraint: String, message: String },
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("uncategorized error: {0}")]
    Uncategorized(String),

    #[error("no value provided for parameter :{0}")]
    MissingParameterValue(String),
    #[error("statement has no parameter {0}")]
    UnknownParameter(String),
    #[error("no suitable converter for value of type {type_name} (parameter {param})")]
    NoSuitableConverter { param: String, type_name: String },

    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("no such column: {0}")]
    NoSuchColumn(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("converter for {0} is already registered")]
    DuplicateConverter(String),

    #[error("connection release failed: {0}")]
    ConnectionRelease(String),
    #[error("connection has been released")]
    ConnectionReleased,
    #[error("connection is busy with a previous operation")]
    ConnectionBusy,
}

/// Coarse grouping of [`RdbcError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connect,
    Statement,
    Binding,
    Conversion,
    Lifecycle,
}

impl RdbcError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RdbcError::Connect(_) => ErrorCategory::Connect,
            RdbcError::Unauthorized(_)
            | RdbcError::InvalidQuery(_)
            | RdbcError::InactiveTransaction
            | RdbcError::ConstraintViolation { .. }
            | RdbcError::Timeout(_)
            | RdbcError::Uncategorized(_) => ErrorCategory::Statement,
            RdbcError::MissingParameterValue(_)
            | RdbcError::UnknownParameter(_)
            | RdbcError::NoSuitableConverter { .. } => ErrorCategory::Binding,
            RdbcError::Conversion(_)
            | RdbcError::NoSuchColumn(_)
            | RdbcError::InvalidState(_)
            | RdbcError::DuplicateConverter(_) => ErrorCategory::Conversion,
            RdbcError::ConnectionRelease(_)
            | RdbcError::ConnectionReleased
            | RdbcError::ConnectionBusy => ErrorCategory::Lifecycle,
        }
    }

    pub(crate) fn conversion(value: impl std::fmt::Display, target: &str) -> Self {
        RdbcError::Conversion(format!("value {value} is not convertible to {target}"))
    }
}
