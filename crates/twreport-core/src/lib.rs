//! twreport core - normalizer for Taiwan exchange report CSVs
//!
//! TWSE and TPEx publish their daily reports as loosely formatted,
//! Big5-encoded CSVs whose titles, header rows and column names shift from
//! report to report. This crate turns each one into a canonical table keyed
//! by a four-digit stock identifier.
//!
//! # Architecture
//!
//! ```text
//! RawReport → decode → Header Locator → Column Mapper → rows
//!                                                        ↓
//!                     Stock-ID Extractor + Numeric Coercion
//!                                                        ↓
//!                      ≥1000 filter → dedup → sort → CanonicalTable → CSV
//! ```
//!
//! The batch driver runs that pipeline once per (source, date) file and
//! isolates failures per unit.
//!
//! # Guarantees
//!
//! - **Deterministic**: the same raw bytes always produce identical output bytes
//! - **Total over cells**: numeric noise never fails a table
//! - **Keyed**: every record has a unique `stock_id` of four digits, value ≥ 1000

pub mod batch;
pub mod config;
pub mod decode;
pub mod error;
pub mod formats;
pub mod header;
pub mod mapper;
pub mod normalizer;
pub mod numeric;
pub mod output;
pub mod raw;
pub mod stock_id;
pub mod validation;

use std::fmt;

use chrono::NaiveDate;

pub use config::Config;
pub use error::{Disposition, Error, Result};
pub use formats::{Market, SourceId};
pub use normalizer::{normalize, NormalizeOptions, NormalizeStats, Normalized};
pub use numeric::{clean_numeric, Number};
pub use raw::RawReport;
pub use stock_id::StockId;

/// A cell of a canonical record
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(Number),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// One row keyed by `stock_id`
///
/// `values` is parallel to the owning table's `columns`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CanonicalRecord {
    pub stock_id: StockId,
    pub values: Vec<FieldValue>,
}

/// Normalized table for one (source, date)
///
/// Records are sorted ascending by `stock_id` and keys are unique.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CanonicalTable {
    pub source: SourceId,
    pub report_date: Option<NaiveDate>,
    /// Field names after `stock_id`, in output order
    pub columns: Vec<String>,
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalTable {
    /// Output header row: `stock_id` followed by `columns`
    pub fn headers(&self) -> Vec<&str> {
        std::iter::once(mapper::KEY_FIELD)
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == field)
    }

    pub fn get(&self, stock_id: &str) -> Option<&CanonicalRecord> {
        self.records
            .binary_search_by(|r| r.stock_id.as_str().cmp(stock_id))
            .ok()
            .map(|i| &self.records[i])
    }

    /// Value of `field` for `stock_id`
    pub fn value(&self, stock_id: &str, field: &str) -> Option<&FieldValue> {
        let col = self.column_index(field)?;
        self.get(stock_id)?.values.get(col)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
