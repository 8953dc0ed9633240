//! Stock identifier extraction and validation
//!
//! Report cells carry codes as `="2330"` formula quoting, as three-digit
//! codes that lost their leading zero, or mixed with names and warrant
//! suffixes. Extraction yields a clean four-digit `StockId` or nothing.
//!
//! # Policy (in priority order)
//!
//! 1. Strip whitespace, leading `=` markers and surrounding quotes
//! 2. Pure digits: 3 → zero-pad, 4 → accept, any other length → reject
//! 3. Any CJK ideograph or Latin letter → reject (warrants, ETNs, specials)
//! 4. Otherwise a leading run of 3 or 4 digits is taken, padded to 4
//!
//! The `>= 1000` listed-equity rule is a table-level filter and is applied
//! by the normalizer, not here.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Smallest code of a listed common stock; lower codes are placeholders
pub const MIN_EQUITY_CODE: u16 = 1000;

/// A validated four-digit stock identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct StockId(String);

impl StockId {
    /// Extract an identifier from a raw report cell
    pub fn extract(raw: &str) -> Option<StockId> {
        let s = strip_artifacts(raw);
        if s.is_empty() {
            return None;
        }

        if s.chars().all(|c| c.is_ascii_digit()) {
            return from_digits(s);
        }

        if s.chars().any(|c| is_cjk(c) || is_latin_letter(c)) {
            return None;
        }

        let run = s.chars().take_while(|c| c.is_ascii_digit()).count();
        // Runs longer than four digits belong to other instruments
        from_digits(&s[..run])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the code
    pub fn value(&self) -> u16 {
        // Construction guarantees four ASCII digits
        self.0.bytes().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'))
    }

    /// Whether the code is in the listed-equity range
    pub fn is_listed_equity(&self) -> bool {
        self.value() >= MIN_EQUITY_CODE
    }
}

impl fmt::Display for StockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StockId {
    type Err = Error;

    /// Strict parse used when reading canonical output: exactly four digits
    fn from_str(s: &str) -> Result<Self> {
        if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(StockId(s.to_string()))
        } else {
            Err(Error::InvalidOutput(format!("malformed stock_id {:?}", s)))
        }
    }
}

fn strip_artifacts(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches('=')
        .trim_matches(|c: char| c == '"' || c.is_whitespace())
}

fn from_digits(digits: &str) -> Option<StockId> {
    match digits.len() {
        3 => Some(StockId(format!("0{}", digits))),
        4 => Some(StockId(digits.to_string())),
        _ => None,
    }
}

/// CJK unified ideographs, Extension A and compatibility ideographs
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
        || ('\u{3400}'..='\u{4dbf}').contains(&c)
        || ('\u{f900}'..='\u{faff}').contains(&c)
}

fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || ('\u{ff21}'..='\u{ff3a}').contains(&c) || ('\u{ff41}'..='\u{ff5a}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(raw: &str) -> Option<String> {
        StockId::extract(raw).map(|id| id.as_str().to_string())
    }

    #[test]
    fn test_four_digits_accepted() {
        assert_eq!(extract("2330").as_deref(), Some("2330"));
        assert_eq!(extract("  1101 ").as_deref(), Some("1101"));
    }

    #[test]
    fn test_formula_quoting_stripped() {
        assert_eq!(extract("=\"2330\"").as_deref(), Some("2330"));
        assert_eq!(extract("=2884").as_deref(), Some("2884"));
    }

    #[test]
    fn test_three_digits_padded_then_filtered() {
        let id = StockId::extract("600").unwrap();
        assert_eq!(id.as_str(), "0600");
        assert!(!id.is_listed_equity(), "0600 is below the equity range");

        let id = StockId::extract("2330").unwrap();
        assert!(id.is_listed_equity());
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        assert_eq!(extract("12"), None);
        assert_eq!(extract("00679"), None);
        assert_eq!(extract("712345"), None);
        assert_eq!(extract(""), None);
        assert_eq!(extract("="), None);
    }

    #[test]
    fn test_letters_and_cjk_rejected() {
        assert_eq!(extract("ABC1"), None);
        assert_eq!(extract("00632R"), None);
        assert_eq!(extract("2330 台積電"), None);
        assert_eq!(extract("合計"), None);
        assert_eq!(extract("１２３Ａ"), None);
    }

    #[test]
    fn test_extension_and_compatibility_ideographs_rejected() {
        assert_eq!(extract("2330\u{3400}"), None);
        assert_eq!(extract("2330 \u{4db5}"), None);
        assert_eq!(extract("1101\u{f900}"), None);
        assert_eq!(extract("1101\u{fa0e}"), None);
    }

    #[test]
    fn test_leading_run_with_punctuation() {
        assert_eq!(extract("1234*").as_deref(), Some("1234"));
        assert_eq!(extract("123-").as_deref(), Some("0123"));
        assert_eq!(extract("12345*"), None);
    }

    #[test]
    fn test_value_and_strict_parse() {
        let id: StockId = "0050".parse().unwrap();
        assert_eq!(id.value(), 50);
        assert!("50".parse::<StockId>().is_err());
        assert!("2330 ".parse::<StockId>().is_err());
    }
}
