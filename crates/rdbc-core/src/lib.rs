pub mod convert;
pub mod converters;
pub mod decimal;
pub mod error;
pub mod numeric;
pub mod param;
pub mod row;
pub mod types;

pub use convert::{Arg, BoundValue, Converter, TypeConverterRegistry};
pub use decimal::{Decimal, ParseDecimalError};
pub use error::{ErrorCategory, RdbcError, Result};
pub use numeric::SqlNumeric;
pub use param::SqlParam;
pub use row::{ColumnIndex, ColumnMetadata, ResultSet, Row, RowMetadata, Warning};
pub use types::{SqlType, SqlValue};

#[cfg(test)]
mod tests;
