use crate::decimal::Decimal;
use crate::error::{RdbcError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL numeric value. Unlike [`Decimal`] it can also hold NaN and the two
/// infinities that some engines allow in NUMERIC columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlNumeric {
    NaN,
    PositiveInfinity,
    NegativeInfinity,
    Finite(Decimal),
}

impl SqlNumeric {
    pub fn is_nan(&self) -> bool {
        matches!(self, SqlNumeric::NaN)
    }

    pub fn is_positive_infinity(&self) -> bool {
        matches!(self, SqlNumeric::PositiveInfinity)
    }

    pub fn is_negative_infinity(&self) -> bool {
        matches!(self, SqlNumeric::NegativeInfinity)
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, SqlNumeric::Finite(_))
    }

    /// The decimal value; fails with `InvalidState` for NaN and infinities.
    pub fn value(&self) -> Result<Decimal> {
        match self {
            SqlNumeric::Finite(d) => Ok(*d),
            other => Err(RdbcError::InvalidState(format!(
                "numeric value is {other}, not a finite decimal"
            ))),
        }
    }

    /// Only NaN and the infinities map to the special values; a finite
    /// float outside the [`Decimal`] range fails with `Conversion`.
    pub fn from_f64(value: f64) -> Result<Self> {
        if value.is_nan() {
            Ok(SqlNumeric::NaN)
        } else if value == f64::INFINITY {
            Ok(SqlNumeric::PositiveInfinity)
        } else if value == f64::NEG_INFINITY {
            Ok(SqlNumeric::NegativeInfinity)
        } else {
            Decimal::from_f64(value)
                .map(SqlNumeric::Finite)
                .ok_or_else(|| RdbcError::conversion(value, "numeric"))
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            SqlNumeric::NaN => f64::NAN,
            SqlNumeric::PositiveInfinity => f64::INFINITY,
            SqlNumeric::NegativeInfinity => f64::NEG_INFINITY,
            SqlNumeric::Finite(d) => d.to_f64(),
        }
    }
}

impl From<Decimal> for SqlNumeric {
    fn from(value: Decimal) -> Self {
        SqlNumeric::Finite(value)
    }
}

impl fmt::Display for SqlNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlNumeric::NaN => f.write_str("NaN"),
            SqlNumeric::PositiveInfinity => f.write_str("Infinity"),
            SqlNumeric::NegativeInfinity => f.write_str("-Infinity"),
            SqlNumeric::Finite(d) => write!(f, "{d}"),
        }
    }
}

impl FromStr for SqlNumeric {
    type Err = RdbcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "NaN" => Ok(SqlNumeric::NaN),
            "Infinity" | "+Infinity" => Ok(SqlNumeric::PositiveInfinity),
            "-Infinity" => Ok(SqlNumeric::NegativeInfinity),
            other => other
                .parse::<Decimal>()
                .map(SqlNumeric::Finite)
                .map_err(|e| RdbcError::Conversion(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqlNumeric;
    use crate::decimal::Decimal;
    use crate::error::RdbcError;

    #[test]
    fn nan_has_no_decimal_value() {
        let nan = SqlNumeric::NaN;
        assert!(nan.is_nan());
        assert!(!nan.is_finite());
        assert!(matches!(nan.value(), Err(RdbcError::InvalidState(_))));
        assert!(matches!(
            SqlNumeric::NegativeInfinity.value(),
            Err(RdbcError::InvalidState(_))
        ));
    }

    #[test]
    fn finite_exposes_its_decimal() {
        let d = Decimal::new(31415, 4);
        let numeric = SqlNumeric::Finite(d);
        assert_eq!(numeric.value(), Ok(d));
        assert!(numeric.is_finite());
    }

    #[test]
    fn maps_non_finite_floats() {
        assert!(SqlNumeric::from_f64(f64::NAN).expect("nan").is_nan());
        assert!(SqlNumeric::from_f64(f64::INFINITY)
            .expect("inf")
            .is_positive_infinity());
        assert!(SqlNumeric::from_f64(f64::NEG_INFINITY)
            .expect("-inf")
            .is_negative_infinity());
        assert_eq!("-Infinity".parse::<SqlNumeric>(), Ok(SqlNumeric::NegativeInfinity));
    }

    #[test]
    fn finite_floats_never_become_nan() {
        assert_eq!(
            SqlNumeric::from_f64(1.5e20),
            Ok(SqlNumeric::Finite(
                "150000000000000000000".parse().expect("decimal")
            ))
        );
        assert_eq!(
            SqlNumeric::from_f64(1e-40),
            Ok(SqlNumeric::Finite(Decimal::ZERO))
        );
        assert!(matches!(
            SqlNumeric::from_f64(1e300),
            Err(RdbcError::Conversion(_))
        ));
    }
}
