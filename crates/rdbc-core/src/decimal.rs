use serde::{de, Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

pub const MAX_SCALE: u32 = 38;

/// Exact decimal number stored as `mantissa * 10^-scale`.
///
/// Precision is bounded by the `i128` mantissa: at most 38 significant
/// digits and at most [`MAX_SCALE`] fractional digits. Values outside that
/// range are rejected rather than rounded, except in [`Decimal::from_f64`]
/// where digits past [`MAX_SCALE`] are rounded half away from zero.
///
/// Equality and ordering compare numeric value, so `1.0 == 1.00`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

#[derive(Deserialize)]
#[serde(rename = "Decimal")]
struct RawDecimal {
    mantissa: i128,
    scale: u32,
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDecimal::deserialize(deserializer)?;
        Decimal::try_new(raw.mantissa, raw.scale).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal literal: {0}")]
pub struct ParseDecimalError(String);

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    /// Panics if `scale` exceeds [`MAX_SCALE`].
    pub fn new(mantissa: i128, scale: u32) -> Self {
        assert!(scale <= MAX_SCALE, "decimal scale {scale} exceeds {MAX_SCALE}");
        Self { mantissa, scale }
    }

    pub fn try_new(mantissa: i128, scale: u32) -> Result<Self, ParseDecimalError> {
        if scale > MAX_SCALE {
            return Err(ParseDecimalError(format!(
                "scale {scale} exceeds {MAX_SCALE}"
            )));
        }
        Ok(Self { mantissa, scale })
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Integer part, truncated toward zero.
    pub fn trunc(&self) -> i128 {
        self.mantissa / 10i128.pow(self.scale)
    }

    pub fn is_integer(&self) -> bool {
        self.mantissa % 10i128.pow(self.scale) == 0
    }

    /// Same value with trailing fractional zeros removed.
    pub fn normalize(&self) -> Self {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Shortest decimal that reads back as `value`, rounded to
    /// [`MAX_SCALE`] fractional digits. `None` for NaN, infinities and
    /// magnitudes beyond the mantissa range.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        parse(&format!("{value:e}"), true)
            .ok()
            .map(|d| d.normalize())
    }

    fn rescaled(&self, scale: u32) -> Option<i128> {
        let factor = 10i128.checked_pow(scale.checked_sub(self.scale)?)?;
        self.mantissa.checked_mul(factor)
    }
}

impl From<i16> for Decimal {
    fn from(value: i16) -> Self {
        Self::new(value as i128, 0)
    }
}

impl From<i32> for Decimal {
    fn from(value: i32) -> Self {
        Self::new(value as i128, 0)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::new(value as i128, 0)
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s, false)
    }
}

/// Parses plain or exponent notation. Digits past [`MAX_SCALE`] are an
/// error unless `round` is set, in which case they are rounded half away
/// from zero.
fn parse(s: &str, round: bool) -> Result<Decimal, ParseDecimalError> {
    let err = || ParseDecimalError(s.to_string());
    let text = s.trim();
    let (base, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => {
            let exp: i64 = text[pos + 1..].parse().map_err(|_| err())?;
            (&text[..pos], exp)
        }
        None => (text, 0),
    };
    let (negative, unsigned) = match base.as_bytes().first() {
        Some(b'-') => (true, &base[1..]),
        Some(b'+') => (false, &base[1..]),
        _ => (false, base),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(err());
    }

    let digits = format!("{int_part}{frac_part}");
    let mut mantissa: i128 = digits.parse().map_err(|_| err())?;
    let frac_len = i64::try_from(frac_part.len()).map_err(|_| err())?;
    let mut scale = frac_len.checked_sub(exponent).ok_or_else(err)?;
    if mantissa == 0 {
        scale = scale.clamp(0, MAX_SCALE as i64);
    }
    if scale < 0 {
        let shift = scale.checked_neg().ok_or_else(err)?;
        let factor = 10i128
            .checked_pow(u32::try_from(shift).map_err(|_| err())?)
            .ok_or_else(err)?;
        mantissa = mantissa.checked_mul(factor).ok_or_else(err)?;
        scale = 0;
    }
    while scale > MAX_SCALE as i64 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    if scale > MAX_SCALE as i64 {
        if !round {
            return Err(err());
        }
        mantissa = match u32::try_from(scale - MAX_SCALE as i64)
            .ok()
            .and_then(|drop| 10i128.checked_pow(drop))
        {
            Some(divisor) => {
                let (quotient, remainder) = (mantissa / divisor, mantissa % divisor);
                if remainder >= divisor - remainder {
                    quotient + 1
                } else {
                    quotient
                }
            }
            None => 0,
        };
        scale = MAX_SCALE as i64;
    }
    if negative {
        mantissa = -mantissa;
    }
    Ok(Decimal {
        mantissa,
        scale: scale as u32,
    })
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        match (self.rescaled(scale), other.rescaled(scale)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self
                .to_f64()
                .partial_cmp(&other.to_f64())
                .unwrap_or(Ordering::Equal),
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let normalized = self.normalize();
        normalized.mantissa.hash(state);
        normalized.scale.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::Decimal;

    #[test]
    fn parses_and_renders_canonical_text() {
        let d: Decimal = "-12.340".parse().expect("parse");
        assert_eq!(d.mantissa(), -12340);
        assert_eq!(d.scale(), 3);
        assert_eq!(d.to_string(), "-12.340");
        assert_eq!("0.05".parse::<Decimal>().expect("parse").to_string(), "0.05");
        assert_eq!("1.5e2".parse::<Decimal>().expect("parse").to_string(), "150");
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn equality_ignores_trailing_zeros() {
        assert_eq!(Decimal::new(10, 1), Decimal::new(1, 0));
        assert!(Decimal::new(15, 1) > Decimal::from(1i64));
    }

    #[test]
    fn extreme_exponents_fail_without_panicking() {
        assert!("1e-9223372036854775808".parse::<Decimal>().is_err());
        assert!("1e9223372036854775807".parse::<Decimal>().is_err());
        assert!("1e-40".parse::<Decimal>().is_err());
        assert_eq!(
            "0e-9223372036854775807".parse::<Decimal>().expect("zero"),
            Decimal::ZERO
        );
        assert_eq!("1000e-40".parse::<Decimal>().expect("parse"), Decimal::new(1, 37));
    }

    #[test]
    fn from_f64_keeps_exponent_range_values() {
        assert_eq!(Decimal::from_f64(0.1).expect("0.1").to_string(), "0.1");
        assert_eq!(Decimal::from_f64(-2.5e-3).expect("small").to_string(), "-0.0025");
        assert_eq!(
            Decimal::from_f64(1.5e20).expect("large"),
            "150000000000000000000".parse::<Decimal>().expect("parse")
        );
        assert_eq!(Decimal::from_f64(1e-40).expect("tiny"), Decimal::ZERO);
        assert_eq!(Decimal::from_f64(6e-39).expect("rounded"), Decimal::new(1, 38));
        assert_eq!(Decimal::from_f64(1e300), None);
        assert_eq!(Decimal::from_f64(f64::NAN), None);
    }

    #[test]
    fn scale_beyond_limit_is_rejected() {
        assert_eq!(Decimal::try_new(125, 2), Ok(Decimal::new(125, 2)));
        assert!(Decimal::try_new(1, 60).is_err());
    }

    #[test]
    fn trunc_rounds_toward_zero() {
        assert_eq!(Decimal::new(199, 2).trunc(), 1);
        assert_eq!(Decimal::new(-199, 2).trunc(), -1);
    }
}
