//! Error types for the report normalizer
//!
//! All fallible operations return `Result<T, Error>`.
//! Row-level data problems (bad stock codes, unparsable numbers) are never
//! errors; they are counted in `NormalizeStats` instead.

use thiserror::Error as ThisError;

/// Normalizer error types
#[derive(Debug, ThisError)]
pub enum Error {
    /// No row within the scan window carried every required header token
    #[error("header not found: no row among the first {scanned} contains {needles:?}")]
    HeaderNotFound { needles: Vec<String>, scanned: usize },

    /// A required column rule matched no header
    #[error("missing required column: {field}")]
    MissingRequiredColumn { field: String },

    /// Every row was dropped during cleaning
    #[error("no rows after cleaning: {0}")]
    EmptyTable(String),

    /// Source tag or file name does not map to a known report format
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// Payload is an HTML error page or too small to be a report
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Dated output requested for a report whose date is unknown
    #[error("missing report date: {0}")]
    MissingReportDate(String),

    /// A cleaned output file does not follow the canonical layout
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// Configuration could not be loaded or resolved
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How the batch driver books a failed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The unit was never processed (routing failure)
    Skip,
    /// The unit was processed and failed
    Fail,
}

impl Error {
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::UnknownFormat(_) | Error::InvalidPayload(_) | Error::MissingReportDate(_) => {
                Disposition::Skip
            }
            _ => Disposition::Fail,
        }
    }

    /// Short machine-readable tag used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::HeaderNotFound { .. } => "header_not_found",
            Error::MissingRequiredColumn { .. } => "missing_required_column",
            Error::EmptyTable(_) => "empty_table",
            Error::UnknownFormat(_) => "unknown_format",
            Error::InvalidPayload(_) => "invalid_payload",
            Error::MissingReportDate(_) => "missing_report_date",
            Error::InvalidOutput(_) => "invalid_output",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Csv(_) => "csv",
            Error::Json(_) => "json",
        }
    }
}

/// Result type alias for normalizer operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_errors_are_skips() {
        assert_eq!(
            Error::UnknownFormat("x".into()).disposition(),
            Disposition::Skip
        );
        assert_eq!(
            Error::InvalidPayload("html".into()).disposition(),
            Disposition::Skip
        );
    }

    #[test]
    fn test_structural_errors_are_failures() {
        let err = Error::MissingRequiredColumn {
            field: "close".into(),
        };
        assert_eq!(err.disposition(), Disposition::Fail);
        assert_eq!(err.kind(), "missing_required_column");
        assert_eq!(err.to_string(), "missing required column: close");
    }
}
