//! Output verifier — checks a cleaned file against the canonical layout
//!
//! Used on files already on disk, whichever run produced them. Like a
//! compiler's checker it accumulates every diagnostic instead of stopping at
//! the first problem.
//!
//! # Checks
//!
//! 1. **Encoding**: UTF-8, with a byte-order mark (missing BOM is a warning)
//! 2. **Layout**: header starts with `stock_id`, rows are not ragged,
//!    columns belong to the declared format
//! 3. **Keys**: every id is four digits, ≥ 1000, unique, ascending
//! 4. **Values**: numeric columns hold numbers

use std::collections::HashSet;
use std::fmt;

use crate::formats::SourceId;
use crate::mapper::{FieldKind, KEY_FIELD};
use crate::output::UTF8_BOM;
use crate::stock_id::StockId;

// ── Verification Result Types ─────────────────────────────

/// Result of output verification — accumulates all diagnostics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VerificationResult {
    pub rows: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationResult {
    /// Returns true if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    fn add_error(&mut self, kind: DiagnosticKind, message: String, line: Option<usize>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            message,
            line,
        });
    }

    fn add_warning(&mut self, kind: DiagnosticKind, message: String, line: Option<usize>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            message,
            line,
        });
    }
}

/// A single verification diagnostic
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// 1-based line in the file
    pub line: Option<usize>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if let Some(line) = self.line {
            write!(f, "{} [{}] at line {}: {}", prefix, self.kind, line, self.message)
        } else {
            write!(f, "{} [{}]: {}", prefix, self.kind, self.message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Category of verification issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Encoding,
    Layout,
    StockId,
    Duplicate,
    Ordering,
    Value,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiagnosticKind::Encoding => write!(f, "encoding"),
            DiagnosticKind::Layout => write!(f, "layout"),
            DiagnosticKind::StockId => write!(f, "stock_id"),
            DiagnosticKind::Duplicate => write!(f, "duplicate"),
            DiagnosticKind::Ordering => write!(f, "ordering"),
            DiagnosticKind::Value => write!(f, "value"),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Verify the bytes of one cleaned file
///
/// With `source`, columns are checked against that format's fields and
/// numeric columns must hold numbers.
pub fn verify_output(bytes: &[u8], source: Option<SourceId>) -> VerificationResult {
    let mut result = VerificationResult::default();

    let body = match bytes.strip_prefix(UTF8_BOM) {
        Some(body) => body,
        None => {
            result.add_warning(DiagnosticKind::Encoding, "missing UTF-8 byte-order mark".into(), None);
            bytes
        }
    };
    if std::str::from_utf8(body).is_err() {
        result.add_error(DiagnosticKind::Encoding, "file is not valid UTF-8".into(), None);
        return result;
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body);
    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(record),
            Err(e) => {
                result.add_error(DiagnosticKind::Layout, format!("unreadable CSV: {}", e), None);
                return result;
            }
        }
    }

    let Some((header, data)) = rows.split_first() else {
        result.add_error(DiagnosticKind::Layout, "file is empty".into(), None);
        return result;
    };
    check_header(&mut result, header, source);

    let kinds: Vec<FieldKind> = header
        .iter()
        .map(|h| match source {
            Some(source) => source.spec().field_kind(h),
            None => FieldKind::Text,
        })
        .collect();

    let mut seen = HashSet::new();
    let mut previous: Option<StockId> = None;
    for (i, row) in data.iter().enumerate() {
        let line = i + 2;
        result.rows += 1;

        if row.len() != header.len() {
            result.add_error(
                DiagnosticKind::Layout,
                format!("{} fields, header has {}", row.len(), header.len()),
                Some(line),
            );
        }

        let raw_id = row.get(0).unwrap_or("");
        match raw_id.parse::<StockId>() {
            Ok(id) => {
                if !id.is_listed_equity() {
                    result.add_error(DiagnosticKind::StockId, format!("{} is below 1000", id), Some(line));
                }
                if !seen.insert(id.clone()) {
                    result.add_error(DiagnosticKind::Duplicate, format!("{} appears more than once", id), Some(line));
                }
                if let Some(prev) = &previous {
                    if *prev > id {
                        result.add_error(DiagnosticKind::Ordering, format!("{} sorts before {}", id, prev), Some(line));
                    }
                }
                previous = Some(id);
            }
            Err(_) => result.add_error(DiagnosticKind::StockId, format!("malformed stock_id {:?}", raw_id), Some(line)),
        }

        for (col, (cell, kind)) in row.iter().zip(&kinds).enumerate().skip(1) {
            if *kind == FieldKind::Numeric && cell.parse::<f64>().map(|v| !v.is_finite()).unwrap_or(true) {
                result.add_error(
                    DiagnosticKind::Value,
                    format!("{}: {:?} is not a number", &header[col], cell),
                    Some(line),
                );
            }
        }
    }

    if result.rows == 0 {
        result.add_warning(DiagnosticKind::Layout, "no data rows".into(), None);
    }
    result
}

fn check_header(result: &mut VerificationResult, header: &csv::StringRecord, source: Option<SourceId>) {
    if header.get(0) != Some(KEY_FIELD) {
        result.add_error(
            DiagnosticKind::Layout,
            format!("first column is {:?}, expected {:?}", header.get(0).unwrap_or(""), KEY_FIELD),
            Some(1),
        );
    }

    let mut names = HashSet::new();
    for name in header.iter() {
        if !names.insert(name) {
            result.add_error(DiagnosticKind::Layout, format!("column {:?} repeated", name), Some(1));
        }
    }

    let Some(source) = source else { return };
    let spec = source.spec();
    let known = spec.field_names();
    for name in header.iter().skip(1) {
        let is_mark = spec
            .mark_columns
            .map(|m| name == m.field || name.starts_with(&format!("{}_", m.field)))
            .unwrap_or(false);
        if !known.iter().any(|k| *k == name) && !is_mark {
            result.add_warning(
                DiagnosticKind::Layout,
                format!("column {:?} is not a {} field", name, source),
                Some(1),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_bom(text: &str) -> Vec<u8> {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(text.as_bytes());
        bytes
    }

    fn kinds(result: &VerificationResult) -> Vec<DiagnosticKind> {
        result.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_valid_output_passes() {
        let result = verify_output(&with_bom("stock_id,foreign_buy,insti_net\n1101,-5,0.5\n2330,1000,500\n"), Some(SourceId::T86));
        assert!(result.is_valid(), "{:?}", result.diagnostics);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.rows, 2);
    }

    #[test]
    fn test_missing_bom_is_warning_only() {
        let result = verify_output(b"stock_id,foreign_buy,insti_net\n2330,1,2\n", Some(SourceId::T86));
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
        assert_eq!(result.warnings()[0].kind, DiagnosticKind::Encoding);
    }

    #[test]
    fn test_key_violations_accumulate() {
        let text = "stock_id,insti_net\n2330,1\n0050,1\n2330,1\n1101,1\n23300,1\n";
        let result = verify_output(&with_bom(text), None);
        assert!(!result.is_valid());
        let found = kinds(&result);
        assert!(found.contains(&DiagnosticKind::StockId));
        assert!(found.contains(&DiagnosticKind::Duplicate));
        assert!(found.contains(&DiagnosticKind::Ordering));
        assert_eq!(result.errors().len(), 5, "{:#?}", result.diagnostics);
    }

    #[test]
    fn test_wrong_first_column() {
        let result = verify_output(&with_bom("code,close\n2330,5\n"), None);
        assert_eq!(result.errors()[0].kind, DiagnosticKind::Layout);
        assert_eq!(result.errors()[0].line, Some(1));
    }

    #[test]
    fn test_numeric_columns_checked_with_source() {
        let text = "stock_id,name,close\n2330,台積電,abc\n";
        let result = verify_output(&with_bom(text), Some(SourceId::DailyClose));
        assert_eq!(kinds(&result), vec![DiagnosticKind::Value]);
        assert!(verify_output(&with_bom(text), None).is_valid());
    }

    #[test]
    fn test_foreign_columns_warned_marks_allowed() {
        let text = "stock_id,name,mark,mark_2,extra\n6488,環球晶,Y,*,z\n";
        let result = verify_output(&with_bom(text), Some(SourceId::Exempted));
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
        assert!(result.warnings()[0].message.contains("extra"));
    }

    #[test]
    fn test_ragged_and_empty() {
        let result = verify_output(&with_bom("stock_id,close\n2330\n"), None);
        assert_eq!(kinds(&result), vec![DiagnosticKind::Layout]);
        assert!(!verify_output(b"", None).is_valid());
        let header_only = verify_output(&with_bom("stock_id,close\n"), None);
        assert!(header_only.is_valid());
        assert_eq!(header_only.warnings().len(), 1);
    }

    #[test]
    fn test_diagnostic_display() {
        let result = verify_output(&with_bom("stock_id\n12\n"), None);
        assert_eq!(result.errors()[0].to_string(), "error [stock_id] at line 2: malformed stock_id \"12\"");
    }
}
