//! Fixed-point price numerics.

use crate::AlertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Fixed-point number with 8 decimal places.
/// Prices, baselines and steps all share this precision so step comparisons
/// are exact integer comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FixedPoint(pub u64);

impl FixedPoint {
    /// Number of decimal places.
    pub const DECIMALS: u32 = 8;
    /// Scale factor: 10^8.
    pub const SCALE: u64 = 100_000_000;
    pub const ZERO: FixedPoint = FixedPoint(0);
    /// Largest value that fits a signed 64-bit storage column.
    pub const MAX: FixedPoint = FixedPoint(i64::MAX as u64);

    /// Create from f64, rounding to the nearest representable unit.
    /// Negative and non-finite input clamps to zero.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        Self(((value * Self::SCALE as f64).round() as u64).min(Self::MAX.0))
    }

    /// Convert to f64 (for display).
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Signed difference `self - other` in raw units.
    #[inline]
    pub fn signed_diff(self, other: FixedPoint) -> i128 {
        self.0 as i128 - other.0 as i128
    }

    /// Absolute difference between two values.
    #[inline]
    pub fn abs_diff(self, other: FixedPoint) -> FixedPoint {
        FixedPoint(self.0.abs_diff(other.0))
    }

    /// Raw value as stored in an SQLite INTEGER column.
    pub fn to_raw_i64(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Inverse of [`FixedPoint::to_raw_i64`]. Negative values are rejected.
    pub fn from_raw_i64(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().map(FixedPoint)
    }
}

impl Add for FixedPoint {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for FixedPoint {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

/// Parses plain decimal strings such as `"97123.45"` or `".001"` exactly,
/// without going through f64. Digits past the 8th decimal are truncated.
/// Values above [`FixedPoint::MAX`] are rejected.
impl FromStr for FixedPoint {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AlertError::InvalidNumber(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let int_value: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };

        let mut frac_value: u64 = 0;
        let mut scale = Self::SCALE;
        for digit in frac_part.bytes().take(Self::DECIMALS as usize) {
            scale /= 10;
            frac_value += (digit - b'0') as u64 * scale;
        }

        int_value
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .filter(|&v| v <= Self::MAX.0)
            .map(FixedPoint)
            .ok_or_else(invalid)
    }
}

/// Shortest exact decimal form: `1000`, `0.001`, `97123.45`.
impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int_part = self.0 / Self::SCALE;
        let frac_part = self.0 % Self::SCALE;
        if frac_part == 0 {
            return write!(f, "{}", int_part);
        }
        let frac = format!("{:08}", frac_part);
        write!(f, "{}.{}", int_part, frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fixed_point_from_f64() {
        let fp = FixedPoint::from_f64(100.5);
        assert_eq!(fp.0, 10_050_000_000);
        assert_eq!(fp.to_f64(), 100.5);
    }

    #[test]
    fn test_fixed_point_from_f64_rounds() {
        // 0.1 is not exact in binary; rounding keeps it at one unit of 10^-1
        assert_eq!(FixedPoint::from_f64(0.1).0, 10_000_000);
        assert_eq!(FixedPoint::from_f64(-3.0), FixedPoint::ZERO);
        assert_eq!(FixedPoint::from_f64(f64::NAN), FixedPoint::ZERO);
    }

    #[test]
    fn test_parse_decimal_strings() {
        assert_eq!("30000".parse::<FixedPoint>().unwrap().0, 30_000 * FixedPoint::SCALE);
        assert_eq!("0.001".parse::<FixedPoint>().unwrap().0, 100_000);
        assert_eq!(".5".parse::<FixedPoint>().unwrap().0, 50_000_000);
        assert_eq!("12.".parse::<FixedPoint>().unwrap().0, 12 * FixedPoint::SCALE);
        assert_eq!(" 97123.45 ".parse::<FixedPoint>().unwrap().0, 9_712_345_000_000);
        // Truncates past 8 decimals
        assert_eq!("0.000000019".parse::<FixedPoint>().unwrap().0, 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<FixedPoint>().is_err());
        assert!(".".parse::<FixedPoint>().is_err());
        assert!("-1".parse::<FixedPoint>().is_err());
        assert!("1e5".parse::<FixedPoint>().is_err());
        assert!("abc".parse::<FixedPoint>().is_err());
        assert!("1.2.3".parse::<FixedPoint>().is_err());
    }

    #[test]
    fn test_display_round_trips_exactly() {
        for s in ["1000", "0.001", "97123.45", "0.00000001", "0"] {
            assert_eq!(s.parse::<FixedPoint>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_diffs() {
        let a = FixedPoint::from_f64(30000.0);
        let b = FixedPoint::from_f64(29000.0);
        assert_eq!(a.abs_diff(b), FixedPoint::from_f64(1000.0));
        assert_eq!(b.abs_diff(a), FixedPoint::from_f64(1000.0));
        assert_eq!(b.signed_diff(a), -(1000 * FixedPoint::SCALE as i128));
    }

    #[test]
    fn test_raw_i64_conversion() {
        let fp = FixedPoint::from_f64(42.42);
        assert_eq!(FixedPoint::from_raw_i64(fp.to_raw_i64()), Some(fp));
        assert_eq!(FixedPoint::from_raw_i64(-1), None);
    }

    #[test]
    fn test_parse_rejects_values_beyond_storage_range() {
        let max = "92233720368.54775807".parse::<FixedPoint>().unwrap();
        assert_eq!(max, FixedPoint::MAX);
        assert_eq!(max.to_raw_i64(), i64::MAX);
        assert_eq!(
            "92233720368.54775808".parse::<FixedPoint>(),
            Err(AlertError::InvalidNumber("92233720368.54775808".to_string()))
        );
        assert!("100000000000".parse::<FixedPoint>().is_err());
        assert_eq!(FixedPoint::from_f64(1e300), FixedPoint::MAX);
    }

    #[test]
    fn test_sub_saturates() {
        assert_eq!(FixedPoint(5) - FixedPoint(10), FixedPoint::ZERO);
        assert_eq!(FixedPoint(5) + FixedPoint(10), FixedPoint(15));
    }
}
