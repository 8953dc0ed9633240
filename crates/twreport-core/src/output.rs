//! Canonical CSV output
//!
//! One UTF-8 (with BOM) CSV per (source, date). The header row starts with
//! `stock_id`; integers are written without a fraction and floats in their
//! shortest round-trip form, so re-reading a file yields the same values.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::formats::SourceId;
use crate::mapper::{FieldKind, KEY_FIELD};
use crate::numeric::Number;
use crate::stock_id::StockId;
use crate::{CanonicalRecord, CanonicalTable, Error, FieldValue, Result};

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Output file naming scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// `{YYYYMMDD}_{source_id}.csv`, one file per report date
    #[default]
    Dated,
    /// `cleaned_{source_id}.csv`, overwritten by each run
    Latest,
}

/// File name for a table under the given naming
///
/// # Errors
/// `MissingReportDate` for `Dated` naming without a date.
pub fn output_file_name(source: SourceId, date: Option<NaiveDate>, naming: OutputNaming) -> Result<String> {
    match (naming, date) {
        (OutputNaming::Dated, Some(date)) => Ok(format!("{}_{}.csv", date.format("%Y%m%d"), source)),
        (OutputNaming::Dated, None) => Err(Error::MissingReportDate(source.to_string())),
        (OutputNaming::Latest, _) => Ok(format!("cleaned_{}.csv", source)),
    }
}

/// Serialize a table to BOM-prefixed CSV bytes
pub fn to_csv_bytes(table: &CanonicalTable) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(UTF8_BOM.to_vec());

    writer.write_record(table.headers())?;
    for record in &table.records {
        let row = std::iter::once(record.stock_id.to_string()).chain(record.values.iter().map(FieldValue::to_string));
        writer.write_record(row)?;
    }

    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

/// A table written to disk
#[derive(Debug, Clone)]
pub struct Written {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: usize,
}

/// Write a table under `out_dir`, creating the directory if needed
pub fn write_table(table: &CanonicalTable, out_dir: &Path, naming: OutputNaming) -> Result<Written> {
    let name = output_file_name(table.source, table.report_date, naming)?;
    let bytes = to_csv_bytes(table)?;
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(name);
    fs::write(&path, &bytes)?;
    Ok(Written {
        path,
        sha256: digest(&bytes),
        bytes: bytes.len(),
    })
}

/// SHA-256 of output bytes, lowercase hex
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Read canonical CSV back into a table
///
/// `stock_id` stays text; numeric fields of `source` are parsed strictly.
///
/// # Errors
/// `InvalidOutput` when the header does not start with `stock_id`, an id is
/// not four digits, or a numeric cell does not parse.
pub fn read_table(bytes: &[u8], source: SourceId) -> Result<CanonicalTable> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(body);
    let mut records = reader.records();

    let header = match records.next() {
        Some(header) => header?,
        None => return Err(Error::InvalidOutput("empty file".to_string())),
    };
    if header.get(0) != Some(KEY_FIELD) {
        return Err(Error::InvalidOutput(format!(
            "first column is {:?}, expected {:?}",
            header.get(0).unwrap_or(""),
            KEY_FIELD
        )));
    }
    let columns: Vec<String> = header.iter().skip(1).map(str::to_string).collect();
    let spec = source.spec();
    let kinds: Vec<FieldKind> = columns.iter().map(|c| spec.field_kind(c)).collect();

    let mut out = Vec::new();
    for (line, record) in records.enumerate() {
        let record = record?;
        let stock_id: StockId = record.get(0).unwrap_or("").parse()?;
        let values = record
            .iter()
            .skip(1)
            .zip(&kinds)
            .map(|(cell, kind)| match kind {
                FieldKind::Numeric => parse_number(cell)
                    .map(FieldValue::Number)
                    .ok_or_else(|| Error::InvalidOutput(format!("row {}: {:?} is not a number", line + 2, cell))),
                FieldKind::Text | FieldKind::Key => Ok(FieldValue::Text(cell.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;
        out.push(CanonicalRecord { stock_id, values });
    }

    Ok(CanonicalTable {
        source,
        report_date: None,
        columns,
        records: out,
    })
}

fn parse_number(cell: &str) -> Option<Number> {
    if let Ok(i) = cell.parse::<i64>() {
        return Some(Number::Integer(i));
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite()).map(Number::from_f64)
}
