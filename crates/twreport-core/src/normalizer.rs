//! Report normalizer — raw report bytes to a canonical table
//!
//! # Pipeline
//!
//! 1. Decode bytes with the ordered encoding list
//! 2. Split into CSV records (ragged rows allowed)
//! 3. Locate the header row
//! 4. Map headers onto the format's canonical fields
//! 5. Per data row: extract the stock id (no id → dropped), clean numeric
//!    cells, compute derived fields
//! 6. Drop ids below 1000, keep the first of duplicate ids, stable sort
//!
//! Row-level noise never fails a table; it is counted in `NormalizeStats`.

use std::collections::HashSet;

use chrono::NaiveDate;
use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::decode::{self, decode};
use crate::formats::FormatSpec;
use crate::header::{locate_header, LocateMethod};
use crate::mapper::{collect_extra_columns, map_columns, FieldKind, Resolved, ResolvedColumn};
use crate::numeric::{coerce, Coercion, Number};
use crate::raw::RawReport;
use crate::stock_id::StockId;
use crate::{CanonicalRecord, CanonicalTable, FieldValue, Result};

/// Default bound for the header scan
pub const DEFAULT_HEADER_SCAN_ROWS: usize = 60;

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Decode attempts, in order
    pub encodings: Vec<&'static Encoding>,
    /// Rows examined when scanning for the header
    pub header_scan_rows: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            encodings: decode::default_candidates(),
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
        }
    }
}

/// Counters for one normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct NormalizeStats {
    /// Name of the encoding the text was decoded with
    pub encoding: &'static str,
    pub decode_clean: bool,
    /// 0-based file line of the header row
    pub header_row: usize,
    pub header_method: Option<LocateMethod>,
    /// Data rows after the header, blank ones included
    pub rows_read: usize,
    pub rows_kept: usize,
    pub blank_rows: usize,
    pub dropped_no_id: usize,
    pub dropped_below_min: usize,
    pub duplicates: usize,
    pub placeholder_cells: usize,
    pub unparsable_cells: usize,
}

impl NormalizeStats {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_no_id + self.dropped_below_min + self.duplicates
    }

    /// Numeric cells that became zero without holding a number
    pub fn zero_coerced(&self) -> usize {
        self.placeholder_cells + self.unparsable_cells
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: CanonicalTable,
    pub stats: NormalizeStats,
}

/// Normalize one raw report
///
/// # Errors
/// `HeaderNotFound` and `MissingRequiredColumn` for structural failures;
/// `Csv` if the decoded text cannot be split into records.
pub fn normalize(raw: &RawReport, opts: &NormalizeOptions) -> Result<Normalized> {
    let spec = raw.source.spec();
    let decoded = decode(&raw.bytes, &opts.encodings, spec.header_needles);
    debug!(report = %raw.label, encoding = decoded.encoding.name(), clean = decoded.clean, "decoded");

    let mut normalized = normalize_text(
        &decoded.text,
        spec,
        raw.header_offset,
        raw.report_date,
        opts.header_scan_rows,
    )?;
    normalized.stats.encoding = decoded.encoding.name();
    normalized.stats.decode_clean = decoded.clean;
    Ok(normalized)
}

/// Normalize already-decoded report text
pub fn normalize_text(
    text: &str,
    spec: &FormatSpec,
    header_offset: Option<usize>,
    report_date: Option<NaiveDate>,
    scan_window: usize,
) -> Result<Normalized> {
    let Rows { rows, lines } = read_rows(text)?;
    let hint = header_offset.or(spec.skip_hint).map(|line| record_at_line(&lines, line));
    let found = locate_header(&rows, spec.header_needles, hint, scan_window)?;
    let header_line = lines.get(found.index).copied().unwrap_or(found.index);
    debug!(source = %spec.source, line = header_line, method = ?found.method, "header located");

    let mut normalized = normalize_rows(spec, &rows[found.index], &rows[found.index + 1..], report_date)?;
    normalized.stats.header_row = header_line;
    normalized.stats.header_method = Some(found.method);
    Ok(normalized)
}

/// CSV records and the 0-based file line each one starts on
struct Rows {
    rows: Vec<Vec<String>>,
    lines: Vec<usize>,
}

/// Split text into raw CSV records; rows may differ in length
///
/// Blank lines yield no record, so record indices and file lines diverge.
fn read_rows(text: &str) -> Result<Rows> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let bytes = text.as_bytes();
    let mut rows = Vec::new();
    let mut lines = Vec::new();
    let (mut offset, mut line) = (0usize, 0usize);
    for record in reader.records() {
        let record = record?;
        // A record's position is where the previous one ended, before any
        // skipped blank lines
        let mut start = record.position().map(|p| p.byte() as usize).unwrap_or(offset).max(offset);
        while matches!(bytes.get(start), Some(b'\r' | b'\n')) {
            start += 1;
        }
        line += bytes[offset..start.min(bytes.len())].iter().filter(|&&b| b == b'\n').count();
        offset = start.min(bytes.len());
        lines.push(line);
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Rows { rows, lines })
}

/// Skip hints count file lines: the first record starting at or after `line`
fn record_at_line(lines: &[usize], line: usize) -> usize {
    lines.partition_point(|&l| l < line)
}

fn clean_header(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '\u{feff}' || c.is_whitespace()).to_string()
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Normalize a located header row and the data rows below it
pub fn normalize_rows(
    spec: &FormatSpec,
    header: &[String],
    data: &[Vec<String>],
    report_date: Option<NaiveDate>,
) -> Result<Normalized> {
    let headers: Vec<String> = header.iter().map(|h| clean_header(h)).collect();
    let mut schema = map_columns(&headers, spec.rules)?;
    if let Some(marks) = spec.mark_columns {
        let extra = collect_extra_columns(&headers, &schema, marks.field, marks.matches);
        schema.columns.extend(extra);
    }

    let mut stats = NormalizeStats::default();
    let mut records = Vec::with_capacity(data.len());

    for row in data {
        stats.rows_read += 1;
        if row.iter().all(|c| c.trim().is_empty()) {
            stats.blank_rows += 1;
            continue;
        }
        let Some(stock_id) = StockId::extract(cell(row, schema.key)) else {
            stats.dropped_no_id += 1;
            continue;
        };
        let values = schema
            .columns
            .iter()
            .map(|col| field_value(col, row, &mut stats))
            .collect();
        records.push(CanonicalRecord { stock_id, values });
    }

    let before = records.len();
    records.retain(|r| r.stock_id.is_listed_equity());
    stats.dropped_below_min = before - records.len();

    let mut seen = HashSet::with_capacity(records.len());
    records.retain(|r| seen.insert(r.stock_id.clone()));
    stats.duplicates = before - stats.dropped_below_min - records.len();
    if stats.duplicates > 0 {
        warn!(source = %spec.source, duplicates = stats.duplicates, "duplicate stock ids, kept first occurrence");
    }

    records.sort_by(|a, b| a.stock_id.cmp(&b.stock_id));
    stats.rows_kept = records.len();

    Ok(Normalized {
        table: CanonicalTable {
            source: spec.source,
            report_date,
            columns: schema.field_names(),
            records,
        },
        stats,
    })
}

fn numeric_cell(raw: &str, stats: &mut NormalizeStats) -> Number {
    let (value, how) = coerce(raw);
    match how {
        Coercion::Parsed => {}
        Coercion::Placeholder => stats.placeholder_cells += 1,
        Coercion::Unparsable => stats.unparsable_cells += 1,
    }
    value
}

fn field_value(col: &ResolvedColumn, row: &[String], stats: &mut NormalizeStats) -> FieldValue {
    match (col.resolved, col.kind) {
        (Resolved::ZeroFill, _) => FieldValue::Number(Number::ZERO),
        (Resolved::Difference { minuend, subtrahend }, _) => {
            let a = numeric_cell(cell(row, minuend), stats);
            let b = numeric_cell(cell(row, subtrahend), stats);
            FieldValue::Number(a - b)
        }
        (Resolved::Column(i), FieldKind::Numeric) => FieldValue::Number(numeric_cell(cell(row, i), stats)),
        (Resolved::Column(i), FieldKind::Text | FieldKind::Key) => FieldValue::Text(cell(row, i).trim().to_string()),
    }
}
