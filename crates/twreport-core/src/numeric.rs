//! Numeric coercion for report cells
//!
//! Government reports write numbers with thousands separators, dashes for
//! "no trade", `#` runs for suppressed values and full-width spaces for
//! blanks. Every one of those becomes a number here; nothing in this module
//! can fail.
//!
//! # Guarantees
//!
//! - `clean_numeric` never errors: unparsable input is zero
//! - Integral values stay `Number::Integer`, so output has no spurious `.0`

use std::fmt;
use std::ops::Sub;

/// 2^63: integral floats below this magnitude fit in `i64`
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// A cleaned numeric cell
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub const ZERO: Number = Number::Integer(0);

    /// Build from a float, demoting integral values to `Integer`
    pub fn from_f64(v: f64) -> Self {
        if !v.is_finite() {
            return Number::ZERO;
        }
        if v.fract() == 0.0 && v.abs() < I64_BOUND {
            Number::Integer(v as i64)
        } else {
            Number::Float(v)
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{}", i),
            // f64 Display is the shortest string that parses back to the same value
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => match a.checked_sub(b) {
                Some(v) => Number::Integer(v),
                None => Number::from_f64(a as f64 - b as f64),
            },
            (a, b) => Number::from_f64(a.as_f64() - b.as_f64()),
        }
    }
}

/// What happened to a cell during coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// The cell held a number
    Parsed,
    /// The cell held a recognised "no value" marker
    Placeholder,
    /// The cell held something else; zero was substituted
    Unparsable,
}

/// Whether a separator-stripped, trimmed cell is a "no value" marker
pub fn is_placeholder(s: &str) -> bool {
    matches!(s, "" | "-" | "--" | "---" | "----" | "NA" | "N/A")
        || s.chars().all(|c| c == '#')
}

/// Coerce a raw cell, reporting how the value was obtained
pub fn coerce(raw: &str) -> (Number, Coercion) {
    let stripped = raw.replace(',', "");
    // char::trim covers U+3000 (full-width space)
    let s = stripped.trim();

    if is_placeholder(s) {
        return (Number::ZERO, Coercion::Placeholder);
    }
    if let Ok(i) = s.parse::<i64>() {
        return (Number::Integer(i), Coercion::Parsed);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => (Number::from_f64(v), Coercion::Parsed),
        _ => (Number::ZERO, Coercion::Unparsable),
    }
}

/// Clean a raw cell into a number, zero on anything unusable
pub fn clean_numeric(raw: &str) -> Number {
    coerce(raw).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_separators_stripped() {
        assert_eq!(clean_numeric("1,234").as_f64(), 1234.0);
        assert_eq!(clean_numeric("1,234"), Number::Integer(1234));
        assert_eq!(clean_numeric("-12,345,678"), Number::Integer(-12_345_678));
    }

    #[test]
    fn test_placeholders_are_zero() {
        for raw in ["", "-", "--", "---", "NA", "###", "#", "\u{3000}", "  "] {
            let (value, how) = coerce(raw);
            assert_eq!(value.as_f64(), 0.0, "{:?} should clean to zero", raw);
            assert_eq!(how, Coercion::Placeholder, "{:?} is a placeholder", raw);
        }
    }

    #[test]
    fn test_garbage_is_zero_not_error() {
        let (value, how) = coerce("abc");
        assert_eq!(value, Number::ZERO);
        assert_eq!(how, Coercion::Unparsable);
        assert_eq!(clean_numeric("<p>+</p>"), Number::ZERO);
        assert_eq!(clean_numeric("NaN"), Number::ZERO);
        assert_eq!(clean_numeric("inf"), Number::ZERO);
    }

    #[test]
    fn test_integral_floats_become_integers() {
        assert_eq!(clean_numeric("12.00"), Number::Integer(12));
        assert_eq!(clean_numeric("12.50"), Number::Float(12.5));
        assert_eq!(clean_numeric("+3.25"), Number::Float(3.25));
    }

    #[test]
    fn test_large_integral_floats_become_integers() {
        assert_eq!(clean_numeric("9,007,199,254,740,992.0"), Number::Integer(9_007_199_254_740_992));
        assert_eq!(Number::from_f64(-9.0e15), Number::Integer(-9_000_000_000_000_000));
        assert_eq!(Number::from_f64(1.0e19), Number::Float(1.0e19));
    }

    #[test]
    fn test_display_has_no_spurious_fraction() {
        assert_eq!(clean_numeric("1,000").to_string(), "1000");
        assert_eq!(clean_numeric("595.00").to_string(), "595");
        assert_eq!(clean_numeric("0.1").to_string(), "0.1");
        assert_eq!(clean_numeric("-0.45").to_string(), "-0.45");
    }

    #[test]
    fn test_subtraction_keeps_integers() {
        assert_eq!(
            clean_numeric("5,000") - clean_numeric("3,000"),
            Number::Integer(2000)
        );
        assert_eq!(
            Number::Float(1.5) - Number::Integer(1),
            Number::Float(0.5)
        );
        assert_eq!(
            Number::Float(2.5) - Number::Float(0.5),
            Number::Integer(2)
        );
    }
}
