//! Raw report intake
//!
//! A `RawReport` is what the fetch stage hands over: the undecoded bytes
//! plus what is known about them. It is immutable once built and consumed
//! by a single normalization.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::formats::SourceId;
use crate::{Error, Result};

/// How far into a payload HTML markers are looked for
const HTML_SNIFF_BYTES: usize = 500;

const HTML_MARKERS: [&[u8]; 4] = [b"<html", b"<!doctype", b"<head", b"<script"];

/// Offset between ROC (Minguo) years and Gregorian years
const ROC_YEAR_OFFSET: i32 = 1911;

#[derive(Debug, Clone)]
pub struct RawReport {
    pub bytes: Vec<u8>,
    pub source: SourceId,
    pub report_date: Option<NaiveDate>,
    /// Header skip-row hint from the fetcher; overrides the format default
    pub header_offset: Option<usize>,
    /// File name or other human-readable origin
    pub label: String,
}

impl RawReport {
    pub fn new(bytes: Vec<u8>, source: SourceId) -> Self {
        Self {
            bytes,
            source,
            report_date: None,
            header_offset: None,
            label: source.as_str().to_string(),
        }
    }

    pub fn from_reader<R: Read>(mut reader: R, source: SourceId) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(bytes, source))
    }

    /// Read a file, inferring source and date from its name
    ///
    /// `source` overrides the inferred one.
    pub fn from_path(path: &Path, source: Option<SourceId>) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = match source {
            Some(source) => source,
            None => SourceId::from_filename(&name)?,
        };
        let bytes = fs::read(path)?;
        Ok(Self {
            bytes,
            source,
            report_date: date_from_filename(&name),
            header_offset: None,
            label: name,
        })
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.report_date = Some(date);
        self
    }

    pub fn with_header_offset(mut self, offset: usize) -> Self {
        self.header_offset = Some(offset);
        self
    }

    /// Reject payloads the fetch stage would have treated as failures
    ///
    /// # Errors
    /// `InvalidPayload` when the payload is shorter than `min_bytes` or is an
    /// HTML page rather than CSV.
    pub fn check_payload(&self, min_bytes: usize) -> Result<()> {
        if self.bytes.len() < min_bytes {
            return Err(Error::InvalidPayload(format!(
                "{}: {} bytes, expected at least {}",
                self.label,
                self.bytes.len(),
                min_bytes
            )));
        }
        if looks_like_html(&self.bytes) {
            return Err(Error::InvalidPayload(format!("{}: HTML page instead of CSV", self.label)));
        }
        Ok(())
    }
}

/// Whether the start of a payload carries HTML markup
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head = bytes[..bytes.len().min(HTML_SNIFF_BYTES)].to_ascii_lowercase();
    HTML_MARKERS
        .iter()
        .any(|marker| head.windows(marker.len()).any(|w| w == *marker))
}

/// Extract a report date from a file name
///
/// Takes the first run of exactly 8 digits as Gregorian `YYYYMMDD`, or
/// of exactly 7 digits as ROC `yyyMMdd`. Runs of other lengths are ignored.
pub fn date_from_filename(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let run = &name[start..i];
        let date = match run.len() {
            8 => NaiveDate::parse_from_str(run, "%Y%m%d").ok(),
            7 => parse_roc(run),
            _ => None,
        };
        if date.is_some() {
            return date;
        }
    }
    None
}

fn parse_roc(run: &str) -> Option<NaiveDate> {
    let year: i32 = run[..3].parse().ok()?;
    let month: u32 = run[3..5].parse().ok()?;
    let day: u32 = run[5..7].parse().ok()?;
    NaiveDate::from_ymd_opt(year + ROC_YEAR_OFFSET, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_gregorian_date_from_filename() {
        assert_eq!(date_from_filename("20240102_t86.csv"), Some(ymd(2024, 1, 2)));
        assert_eq!(date_from_filename("sit_20231229_buy.csv"), Some(ymd(2023, 12, 29)));
    }

    #[test]
    fn test_roc_date_from_filename() {
        assert_eq!(date_from_filename("RSTA3106_1130102.csv"), Some(ymd(2024, 1, 2)));
        assert_eq!(date_from_filename("owz66u_1121229.csv"), Some(ymd(2023, 12, 29)));
    }

    #[test]
    fn test_no_date_in_filename() {
        assert_eq!(date_from_filename("cleaned_t86.csv"), None);
        assert_eq!(date_from_filename("margratio_202401.csv"), None);
        assert_eq!(date_from_filename("20241399_t86.csv"), None);
    }

    #[test]
    fn test_from_reader_takes_all_bytes() {
        let payload: &[u8] = b"title\n\"a\",\"b\"\n";
        let raw = RawReport::from_reader(payload, SourceId::MiIndex).unwrap();
        assert_eq!(raw.bytes, payload);
        assert_eq!(raw.source, SourceId::MiIndex);
        assert_eq!(raw.label, "mi_index");
        assert_eq!(raw.report_date, None);
        assert_eq!(raw.header_offset, None);
    }

    #[test]
    fn test_html_payload_rejected() {
        let raw = RawReport::new(b"\r\n<!DOCTYPE html><html><body>busy</body></html>".to_vec(), SourceId::T86);
        assert!(matches!(raw.check_payload(0), Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_small_payload_rejected() {
        let raw = RawReport::new(b"a,b\n".to_vec(), SourceId::T86);
        assert!(raw.check_payload(500).is_err());
        assert!(raw.check_payload(0).is_ok());
    }

    #[test]
    fn test_html_marker_past_sniff_window_ignored() {
        let mut bytes = vec![b'x'; HTML_SNIFF_BYTES];
        bytes.extend_from_slice(b"<html>");
        assert!(!looks_like_html(&bytes));
    }

    #[test]
    fn test_from_path_infers_source_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240102_twt44u.csv");
        fs::write(&path, b"x").unwrap();
        let raw = RawReport::from_path(&path, None).unwrap();
        assert_eq!(raw.source, SourceId::Twt44u);
        assert_eq!(raw.report_date, Some(ymd(2024, 1, 2)));
        assert_eq!(raw.label, "20240102_twt44u.csv");

        let unknown = dir.path().join("notes.csv");
        fs::write(&unknown, b"x").unwrap();
        assert!(matches!(RawReport::from_path(&unknown, None), Err(Error::UnknownFormat(_))));
    }
}
