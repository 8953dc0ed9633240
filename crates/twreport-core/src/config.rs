//! Run configuration
//!
//! Loaded from a JSON file; every field has a default, so `{}` is a valid
//! configuration. The CLI applies its flags on top of the loaded values.

use std::fs;
use std::path::{Path, PathBuf};

use crate::decode::{resolve_labels, DEFAULT_ENCODINGS};
use crate::normalizer::{NormalizeOptions, DEFAULT_HEADER_SCAN_ROWS};
use crate::output::OutputNaming;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory scanned for raw `*.csv` reports
    pub raw_dir: PathBuf,
    /// Directory cleaned tables are written to
    pub out_dir: PathBuf,
    pub naming: OutputNaming,
    /// Decode attempts in order, as encoding labels
    pub encodings: Vec<String>,
    pub header_scan_rows: usize,
    /// Payloads smaller than this are rejected as fetch failures
    pub min_payload_bytes: usize,
    /// Where to write the JSON run report, if anywhere
    pub report_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            out_dir: PathBuf::from("data/cleaned"),
            naming: OutputNaming::Dated,
            encodings: DEFAULT_ENCODINGS.iter().map(|s| s.to_string()).collect(),
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            min_payload_bytes: 0,
            report_path: None,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.header_scan_rows == 0 {
            return Err(Error::Config("header_scan_rows must be at least 1".to_string()));
        }
        resolve_labels(&self.encodings)?;
        Ok(())
    }

    /// Normalizer options with encoding labels resolved
    pub fn normalize_options(&self) -> Result<NormalizeOptions> {
        Ok(NormalizeOptions {
            encodings: resolve_labels(&self.encodings)?,
            header_scan_rows: self.header_scan_rows,
        })
    }
}
