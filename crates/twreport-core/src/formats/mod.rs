//! Format dispatcher — static table of supported report layouts
//!
//! Every supported report is one `FormatSpec`: the tokens its header row
//! must carry, a skip-row hint, and the ordered column rules that map it
//! onto canonical fields. Dispatch is a lookup from `SourceId`, given either
//! as an explicit tag or inferred from a file name.

mod tpex;
mod twse;

use std::fmt;
use std::str::FromStr;

use crate::mapper::{ColumnRule, FieldKind, KEY_FIELD};
use crate::{Error, Result};

// ── Source identifiers ─────────────────────────────────────

/// Publisher of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Taiwan Stock Exchange
    Twse,
    /// Taipei Exchange (OTC)
    Tpex,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Market::Twse => "TWSE",
            Market::Tpex => "TPEx",
        })
    }
}

/// Tag identifying a report type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(into = "&'static str")]
pub enum SourceId {
    T86,
    Twt44u,
    Twt38u,
    MiMargn,
    MiIndex,
    DailyClose,
    InstitutionalDetail,
    DayTrading,
    Highlight,
    Sbl,
    MarginTransactions,
    Exempted,
    InvestmentTrustBuy,
    InvestmentTrustSell,
}

impl SourceId {
    pub const ALL: [SourceId; 14] = [
        SourceId::T86,
        SourceId::Twt44u,
        SourceId::Twt38u,
        SourceId::MiMargn,
        SourceId::MiIndex,
        SourceId::DailyClose,
        SourceId::InstitutionalDetail,
        SourceId::DayTrading,
        SourceId::Highlight,
        SourceId::Sbl,
        SourceId::MarginTransactions,
        SourceId::Exempted,
        SourceId::InvestmentTrustBuy,
        SourceId::InvestmentTrustSell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::T86 => "t86",
            SourceId::Twt44u => "twt44u",
            SourceId::Twt38u => "twt38u",
            SourceId::MiMargn => "mi_margn",
            SourceId::MiIndex => "mi_index",
            SourceId::DailyClose => "daily_close_no1430",
            SourceId::InstitutionalDetail => "institutional_detail",
            SourceId::DayTrading => "day_trading",
            SourceId::Highlight => "highlight",
            SourceId::Sbl => "sbl",
            SourceId::MarginTransactions => "margin_transactions",
            SourceId::Exempted => "exempted",
            SourceId::InvestmentTrustBuy => "investment_trust_buy",
            SourceId::InvestmentTrustSell => "investment_trust_sell",
        }
    }

    pub fn market(self) -> Market {
        match self {
            SourceId::T86 | SourceId::Twt44u | SourceId::Twt38u | SourceId::MiMargn | SourceId::MiIndex => Market::Twse,
            _ => Market::Tpex,
        }
    }

    /// The static format description for this source
    pub fn spec(self) -> &'static FormatSpec {
        match self {
            SourceId::T86 => &twse::T86,
            SourceId::Twt44u => &twse::TWT44U,
            SourceId::Twt38u => &twse::TWT38U,
            SourceId::MiMargn => &twse::MI_MARGN,
            SourceId::MiIndex => &twse::MI_INDEX,
            SourceId::DailyClose => &tpex::DAILY_CLOSE,
            SourceId::InstitutionalDetail => &tpex::INSTITUTIONAL_DETAIL,
            SourceId::DayTrading => &tpex::DAY_TRADING,
            SourceId::Highlight => &tpex::HIGHLIGHT,
            SourceId::Sbl => &tpex::SBL,
            SourceId::MarginTransactions => &tpex::MARGIN_TRANSACTIONS,
            SourceId::Exempted => &tpex::EXEMPTED,
            SourceId::InvestmentTrustBuy => &tpex::INVESTMENT_TRUST_BUY,
            SourceId::InvestmentTrustSell => &tpex::INVESTMENT_TRUST_SELL,
        }
    }

    /// Infer the source from a file name
    ///
    /// Recognises, in order: a `{YYYYMMDD}_{source_id}` stem, a
    /// `cleaned_{source_id}` stem, then the publisher download names.
    pub fn from_filename(name: &str) -> Result<SourceId> {
        let lower = name.to_lowercase();
        let stem = lower.strip_suffix(".csv").unwrap_or(&lower);

        if let Some((prefix, rest)) = stem.split_once('_') {
            if prefix.len() == 8 && prefix.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(id) = rest.parse() {
                    return Ok(id);
                }
            }
        }
        if let Some(id) = stem.strip_prefix("cleaned_").and_then(|rest| rest.parse().ok()) {
            return Ok(id);
        }

        const PUBLISHER_PATTERNS: [(&str, SourceId); 7] = [
            ("daily_close_no1430", SourceId::DailyClose),
            ("bigd_", SourceId::InstitutionalDetail),
            ("daytraderpt_", SourceId::DayTrading),
            ("margratio_", SourceId::Highlight),
            ("owz66u_", SourceId::Sbl),
            ("rsta3106_", SourceId::MarginTransactions),
            ("margmark_", SourceId::Exempted),
        ];
        if let Some((_, id)) = PUBLISHER_PATTERNS.iter().find(|(p, _)| stem.contains(p)) {
            return Ok(*id);
        }
        if stem.starts_with("sit_") {
            if stem.contains("_buy") {
                return Ok(SourceId::InvestmentTrustBuy);
            }
            if stem.contains("_sell") {
                return Ok(SourceId::InvestmentTrustSell);
            }
        }

        Err(Error::UnknownFormat(name.to_string()))
    }

    /// Resolve an explicit tag, or infer from `filename` when there is none
    pub fn resolve(tag: Option<&str>, filename: &str) -> Result<SourceId> {
        match tag {
            Some(tag) => tag.parse(),
            None => SourceId::from_filename(filename),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SourceId> for &'static str {
    fn from(id: SourceId) -> Self {
        id.as_str()
    }
}

impl FromStr for SourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == tag)
            .ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

// ── Format description ─────────────────────────────────────

/// Extra unclaimed columns to keep as text, named `{field}`, `{field}_2`, …
#[derive(Debug, Clone, Copy)]
pub struct MarkColumns {
    pub field: &'static str,
    pub matches: fn(&str) -> bool,
}

/// Static description of one report layout
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
    pub source: SourceId,
    pub description: &'static str,
    /// Tokens the header row must contain
    pub header_needles: &'static [&'static str],
    /// Expected header row index; may be wrong
    pub skip_hint: Option<usize>,
    pub rules: &'static [ColumnRule],
    pub mark_columns: Option<MarkColumns>,
}

impl FormatSpec {
    /// Kind of a canonical output field of this format
    ///
    /// Unknown fields (collected mark columns) are text.
    pub fn field_kind(&self, field: &str) -> FieldKind {
        if field == KEY_FIELD {
            return FieldKind::Key;
        }
        self.rules
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.kind)
            .unwrap_or(FieldKind::Text)
    }

    /// Canonical field names in declaration order, `stock_id` first
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = vec![KEY_FIELD];
        names.extend(self.rules.iter().filter(|r| r.kind != FieldKind::Key).map(|r| r.field));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_source_round_trips_through_its_tag() {
        for id in SourceId::ALL {
            assert_eq!(id.as_str().parse::<SourceId>().unwrap(), id);
            assert_eq!(id.spec().source, id, "{} spec registered under wrong id", id);
        }
    }

    #[test]
    fn test_unknown_tag_is_unknown_format() {
        assert!(matches!("sec_trading".parse::<SourceId>(), Err(Error::UnknownFormat(_))));
        assert!(matches!("".parse::<SourceId>(), Err(Error::UnknownFormat(_))));
    }

    #[test]
    fn test_every_format_has_exactly_one_key() {
        for id in SourceId::ALL {
            let keys = id.spec().rules.iter().filter(|r| r.kind == FieldKind::Key).count();
            assert_eq!(keys, 1, "{} must declare one key rule", id);
            assert!(!id.spec().header_needles.is_empty(), "{} needs header needles", id);
        }
    }

    #[test]
    fn test_field_names_are_unique() {
        for id in SourceId::ALL {
            let names = id.spec().field_names();
            let mut sorted = names.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), names.len(), "{} declares a field twice", id);
        }
    }

    #[test]
    fn test_filename_inference_dated_and_cleaned() {
        assert_eq!(SourceId::from_filename("20240102_t86.csv").unwrap(), SourceId::T86);
        assert_eq!(SourceId::from_filename("20240102_mi_margn.csv").unwrap(), SourceId::MiMargn);
        assert_eq!(SourceId::from_filename("cleaned_twt38u.csv").unwrap(), SourceId::Twt38u);
        assert_eq!(
            SourceId::from_filename("20240102_investment_trust_sell.csv").unwrap(),
            SourceId::InvestmentTrustSell
        );
    }

    #[test]
    fn test_filename_inference_publisher_patterns() {
        let cases = [
            ("RSTA3106_1130102.csv", SourceId::MarginTransactions),
            ("bigd_20240102.csv", SourceId::InstitutionalDetail),
            ("daily_close_no1430_20240102.csv", SourceId::DailyClose),
            ("DAYTRADERPT_1130102.CSV", SourceId::DayTrading),
            ("margratio_202401.csv", SourceId::Highlight),
            ("owz66u_1130102.csv", SourceId::Sbl),
            ("margmark_1130102.csv", SourceId::Exempted),
            ("sit_20240102_buy.csv", SourceId::InvestmentTrustBuy),
            ("sit_20240102_sell.csv", SourceId::InvestmentTrustSell),
        ];
        for (name, expected) in cases {
            assert_eq!(SourceId::from_filename(name).unwrap(), expected, "{}", name);
        }
    }

    #[test]
    fn test_filename_inference_rejects_unknown() {
        assert!(matches!(SourceId::from_filename("brktop1_1130102.csv"), Err(Error::UnknownFormat(_))));
        assert!(SourceId::from_filename("sit_20240102.csv").is_err());
        assert!(SourceId::from_filename("notes.csv").is_err());
    }

    #[test]
    fn test_explicit_tag_wins_over_filename() {
        assert_eq!(SourceId::resolve(Some("T86"), "bigd_x.csv").unwrap(), SourceId::T86);
        assert_eq!(SourceId::resolve(None, "bigd_x.csv").unwrap(), SourceId::InstitutionalDetail);
    }

    #[test]
    fn test_field_kind_lookup() {
        let spec = SourceId::DailyClose.spec();
        assert_eq!(spec.field_kind("stock_id"), FieldKind::Key);
        assert_eq!(spec.field_kind("name"), FieldKind::Text);
        assert_eq!(spec.field_kind("close"), FieldKind::Numeric);
        assert_eq!(SourceId::Exempted.spec().field_kind("mark_2"), FieldKind::Text);
    }
}
