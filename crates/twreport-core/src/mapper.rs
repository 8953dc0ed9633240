//! Column mapper — translates localized report headers into canonical fields
//!
//! A format declares an ordered list of `ColumnRule`s. Each rule names a
//! canonical field and where its value comes from: a header selector, the
//! difference of two columns, or a constant zero. Mapping resolves every
//! rule against one table's headers and yields the table's `Schema`.
//!
//! # Matching
//!
//! - Rules are resolved in declaration order
//! - A selector takes the first matching header in column order
//! - A header claimed by an earlier rule is not offered to later rules
//!   (`Position` selectors ignore claims; they name raw columns)
//! - A required rule that matches nothing fails with `MissingRequiredColumn`;
//!   an optional one is left out of the schema

use crate::{Error, Result};

/// Canonical name of the key field
pub const KEY_FIELD: &str = "stock_id";

/// How a header is recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Header contains the token
    Contains(&'static str),
    /// Header contains any of the tokens
    ContainsAny(&'static [&'static str]),
    /// Header contains every token
    ContainsAll(&'static [&'static str]),
    /// Header equals the text
    Exact(&'static str),
    /// Header starts with the text
    StartsWith(&'static str),
    /// Raw column index, regardless of header text
    Position(usize),
    /// First selector in the list that matches
    FirstOf(&'static [Selector]),
}

impl Selector {
    fn matches(&self, header: &str) -> bool {
        match *self {
            Selector::Contains(t) => header.contains(t),
            Selector::ContainsAny(ts) => ts.iter().any(|t| header.contains(t)),
            Selector::ContainsAll(ts) => ts.iter().all(|t| header.contains(t)),
            Selector::Exact(t) => header == t,
            Selector::StartsWith(t) => header.starts_with(t),
            Selector::Position(_) | Selector::FirstOf(_) => false,
        }
    }

    /// Resolve against headers, skipping `claimed` columns
    pub fn resolve(&self, headers: &[String], claimed: &[bool]) -> Option<usize> {
        match *self {
            Selector::Position(i) => (i < headers.len()).then_some(i),
            Selector::FirstOf(options) => options.iter().find_map(|s| s.resolve(headers, claimed)),
            _ => headers
                .iter()
                .enumerate()
                .find(|(i, h)| !claimed.get(*i).copied().unwrap_or(false) && self.matches(h))
                .map(|(i, _)| i),
        }
    }
}

/// Where a canonical field's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    Column(Selector),
    /// `minuend − subtrahend`, both cleaned as numbers
    Difference { minuend: Selector, subtrahend: Selector },
    /// Not present in the report; always zero
    ZeroFill,
}

/// Value type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// The stock identifier; exactly one per format
    Key,
    /// Free text kept verbatim (trimmed)
    Text,
    /// Cleaned through numeric coercion
    Numeric,
}

/// One mapping rule: canonical field ← source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRule {
    pub field: &'static str,
    pub source: ColumnSource,
    pub kind: FieldKind,
    pub required: bool,
}

impl ColumnRule {
    pub const fn key(selector: Selector) -> Self {
        Self {
            field: KEY_FIELD,
            source: ColumnSource::Column(selector),
            kind: FieldKind::Key,
            required: true,
        }
    }

    pub const fn numeric(field: &'static str, selector: Selector) -> Self {
        Self {
            field,
            source: ColumnSource::Column(selector),
            kind: FieldKind::Numeric,
            required: false,
        }
    }

    pub const fn text(field: &'static str, selector: Selector) -> Self {
        Self {
            field,
            source: ColumnSource::Column(selector),
            kind: FieldKind::Text,
            required: false,
        }
    }

    pub const fn difference(field: &'static str, minuend: Selector, subtrahend: Selector) -> Self {
        Self {
            field,
            source: ColumnSource::Difference { minuend, subtrahend },
            kind: FieldKind::Numeric,
            required: false,
        }
    }

    pub const fn zero_fill(field: &'static str) -> Self {
        Self {
            field,
            source: ColumnSource::ZeroFill,
            kind: FieldKind::Numeric,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A rule resolved against concrete column indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Column(usize),
    Difference { minuend: usize, subtrahend: usize },
    ZeroFill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub field: String,
    pub kind: FieldKind,
    pub resolved: Resolved,
}

/// The resolved output schema of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Raw column index of the stock identifier
    pub key: usize,
    /// Output columns after `stock_id`, in output order
    pub columns: Vec<ResolvedColumn>,
}

impl Schema {
    pub fn field_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.field.clone()).collect()
    }
}

/// Resolve a rule set against one table's headers
///
/// # Errors
/// `MissingRequiredColumn` when a required rule (always including the key)
/// matches no header.
pub fn map_columns(headers: &[String], rules: &[ColumnRule]) -> Result<Schema> {
    let mut claimed = vec![false; headers.len()];
    let mut key = None;
    let mut columns = Vec::with_capacity(rules.len());

    for rule in rules {
        let resolved = match rule.source {
            ColumnSource::Column(selector) => selector.resolve(headers, &claimed).map(|i| {
                claimed[i] = true;
                Resolved::Column(i)
            }),
            ColumnSource::Difference { minuend, subtrahend } => {
                match (minuend.resolve(headers, &claimed), subtrahend.resolve(headers, &claimed)) {
                    (Some(minuend), Some(subtrahend)) => Some(Resolved::Difference { minuend, subtrahend }),
                    _ => None,
                }
            }
            ColumnSource::ZeroFill => Some(Resolved::ZeroFill),
        };

        match (resolved, rule.kind) {
            (Some(Resolved::Column(i)), FieldKind::Key) => key = Some(i),
            (Some(resolved), kind) => columns.push(ResolvedColumn {
                field: rule.field.to_string(),
                kind,
                resolved,
            }),
            (None, _) if rule.required || rule.kind == FieldKind::Key => {
                return Err(Error::MissingRequiredColumn {
                    field: rule.field.to_string(),
                });
            }
            (None, _) => {}
        }
    }

    let key = key.ok_or_else(|| Error::MissingRequiredColumn {
        field: KEY_FIELD.to_string(),
    })?;

    Ok(Schema { key, columns })
}

/// Collect unclaimed columns whose header satisfies `pred`, named
/// `{base}`, `{base}_2`, `{base}_3`, …
pub fn collect_extra_columns(
    headers: &[String],
    schema: &Schema,
    base: &str,
    pred: impl Fn(&str) -> bool,
) -> Vec<ResolvedColumn> {
    let mut taken = vec![schema.key];
    for col in &schema.columns {
        match col.resolved {
            Resolved::Column(i) => taken.push(i),
            Resolved::Difference { minuend, subtrahend } => taken.extend([minuend, subtrahend]),
            Resolved::ZeroFill => {}
        }
    }

    headers
        .iter()
        .enumerate()
        .filter(|(i, h)| !taken.contains(i) && !h.is_empty() && pred(h))
        .enumerate()
        .map(|(n, (i, _))| ResolvedColumn {
            field: if n == 0 { base.to_string() } else { format!("{}_{}", base, n + 1) },
            kind: FieldKind::Text,
            resolved: Resolved::Column(i),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(hs: &[&str]) -> Vec<String> {
        hs.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_substring_rules_map_in_declaration_order() {
        let hs = headers(&["證券代號", "證券名稱", "外陸資買賣超股數(不含外資自營商)", "三大法人買賣超股數"]);
        let rules = [
            ColumnRule::key(Selector::Contains("證券代號")),
            ColumnRule::numeric("foreign_buy", Selector::Contains("外陸資買賣超股數")),
            ColumnRule::numeric("insti_net", Selector::Contains("三大法人買賣超股數")),
        ];
        let schema = map_columns(&hs, &rules).unwrap();
        assert_eq!(schema.key, 0);
        assert_eq!(schema.field_names(), vec!["foreign_buy", "insti_net"]);
        assert_eq!(schema.columns[0].resolved, Resolved::Column(2));
        assert_eq!(schema.columns[1].resolved, Resolved::Column(3));
    }

    #[test]
    fn test_missing_required_column_fails_table() {
        let hs = headers(&["代號", "名稱"]);
        let rules = [
            ColumnRule::key(Selector::Contains("代號")),
            ColumnRule::numeric("close", Selector::StartsWith("收盤")).required(),
        ];
        match map_columns(&hs, &rules) {
            Err(Error::MissingRequiredColumn { field }) => assert_eq!(field, "close"),
            other => panic!("expected MissingRequiredColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_key_fails_table() {
        let hs = headers(&["名稱", "收盤"]);
        let rules = [ColumnRule::key(Selector::Contains("代號"))];
        assert!(matches!(
            map_columns(&hs, &rules),
            Err(Error::MissingRequiredColumn { field }) if field == KEY_FIELD
        ));
    }

    #[test]
    fn test_optional_rules_are_sparse() {
        let hs = headers(&["代號", "名稱", "收盤"]);
        let rules = [
            ColumnRule::key(Selector::Contains("代號")),
            ColumnRule::text("name", Selector::Contains("名稱")),
            ColumnRule::numeric("avg_price", Selector::Contains("均價")),
            ColumnRule::numeric("close", Selector::StartsWith("收盤")),
        ];
        let schema = map_columns(&hs, &rules).unwrap();
        assert_eq!(schema.field_names(), vec!["name", "close"]);
    }

    #[test]
    fn test_claimed_headers_not_reused() {
        // "資餘額" is a substring of "前資餘額"; the earlier rule claims it first
        let hs = headers(&["代號", "前資餘額", "資買", "資賣", "資餘額"]);
        let rules = [
            ColumnRule::key(Selector::Contains("代號")),
            ColumnRule::numeric("mt_prev_balance", Selector::Contains("前資餘額")),
            ColumnRule::numeric("mt_balance", Selector::Contains("資餘額")),
        ];
        let schema = map_columns(&hs, &rules).unwrap();
        assert_eq!(schema.columns[1].resolved, Resolved::Column(4));
    }

    #[test]
    fn test_first_match_in_column_order_on_ambiguity() {
        let hs = headers(&["代號", "融資買進", "融券買進"]);
        let rules = [
            ColumnRule::key(Selector::Contains("代號")),
            ColumnRule::numeric("buy", Selector::Contains("買進")),
        ];
        let schema = map_columns(&hs, &rules).unwrap();
        assert_eq!(schema.columns[0].resolved, Resolved::Column(1));
    }

    #[test]
    fn test_difference_and_zero_fill_rules() {
        let hs = headers(&["股票代號", "股票名稱", "買進", "賣出", "現金償還", "前日餘額", "今日餘額"]);
        let rules = [
            ColumnRule::key(Selector::Position(0)),
            ColumnRule::difference("margin_diff", Selector::Position(6), Selector::Position(5)),
            ColumnRule::zero_fill("PD_Net"),
        ];
        let schema = map_columns(&hs, &rules).unwrap();
        assert_eq!(
            schema.columns[0].resolved,
            Resolved::Difference { minuend: 6, subtrahend: 5 }
        );
        assert_eq!(schema.columns[1].resolved, Resolved::ZeroFill);
    }

    #[test]
    fn test_first_of_falls_back_to_position() {
        const CODE: Selector = Selector::FirstOf(&[Selector::ContainsAny(&["代號", "代碼"]), Selector::Position(0)]);
        let schema = map_columns(&headers(&["Code", "Name"]), &[ColumnRule::key(CODE)]).unwrap();
        assert_eq!(schema.key, 0);
        let schema = map_columns(&headers(&["x", "證券代碼"]), &[ColumnRule::key(CODE)]).unwrap();
        assert_eq!(schema.key, 1);
    }

    #[test]
    fn test_position_out_of_range_is_missing() {
        let rules = [ColumnRule::key(Selector::Position(0)), ColumnRule::numeric("x", Selector::Position(9)).required()];
        assert!(map_columns(&headers(&["代號"]), &rules).is_err());
    }

    #[test]
    fn test_collect_extra_columns_names_sequentially() {
        let hs = headers(&["證券代號", "證券名稱", "暫停註記", "X", "", "說明文字很長"]);
        let rules = [
            ColumnRule::key(Selector::Contains("代號")),
            ColumnRule::text("name", Selector::Contains("名稱")),
        ];
        let schema = map_columns(&hs, &rules).unwrap();
        let marks = collect_extra_columns(&hs, &schema, "mark", |h| h.contains("註記") || h.chars().count() <= 3);
        let names: Vec<_> = marks.iter().map(|m| m.field.as_str()).collect();
        assert_eq!(names, vec!["mark", "mark_2"]);
        assert_eq!(marks[1].resolved, Resolved::Column(3));
    }
}
