//! Batch driver — normalizes every raw report in a directory
//!
//! Each raw file is one unit of work, keyed by (source, date). Units are
//! independent: a failure is recorded against its unit and the run moves
//! on. The run report carries per-unit outcomes and aggregate counters.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Disposition;
use crate::formats::SourceId;
use crate::normalizer::{normalize, NormalizeOptions, NormalizeStats};
use crate::output::{write_table, OutputNaming, Written};
use crate::raw::{date_from_filename, RawReport};
use crate::{Error, Result};

// ── Report types ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of one raw file
#[derive(Debug, Clone, serde::Serialize)]
pub struct UnitReport {
    pub file: String,
    pub source: Option<SourceId>,
    pub report_date: Option<NaiveDate>,
    pub status: UnitStatus,
    /// Error tag for failed and skipped units
    pub error_kind: Option<&'static str>,
    pub reason: Option<String>,
    pub output: Option<PathBuf>,
    pub sha256: Option<String>,
    pub stats: Option<NormalizeStats>,
}

impl UnitReport {
    fn pending(file: &str, source: Option<SourceId>, report_date: Option<NaiveDate>) -> Self {
        Self {
            file: file.to_string(),
            source,
            report_date,
            status: UnitStatus::Skipped,
            error_kind: None,
            reason: None,
            output: None,
            sha256: None,
            stats: None,
        }
    }

    fn with_error(mut self, err: &Error) -> Self {
        self.status = match err.disposition() {
            Disposition::Skip => UnitStatus::Skipped,
            Disposition::Fail => UnitStatus::Failed,
        };
        self.error_kind = Some(err.kind());
        self.reason = Some(err.to_string());
        self
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub duplicates: usize,
    pub zero_coerced: usize,
    pub units: Vec<UnitReport>,
}

impl RunReport {
    fn push(&mut self, unit: UnitReport) {
        match unit.status {
            UnitStatus::Success => self.succeeded += 1,
            UnitStatus::Failed => self.failed += 1,
            UnitStatus::Skipped => self.skipped += 1,
        }
        if let Some(stats) = &unit.stats {
            self.rows_kept += stats.rows_kept;
            self.rows_dropped += stats.rows_dropped();
            self.duplicates += stats.duplicates;
            self.zero_coerced += stats.zero_coerced();
        }
        self.units.push(unit);
    }

    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.status == UnitStatus::Failed)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

// ── Planning ─────────────────────────────────────────────

#[derive(Debug)]
struct Unit {
    path: PathBuf,
    name: String,
    source: Result<SourceId>,
    date: Option<NaiveDate>,
}

/// Raw `*.csv` files directly under `dir`, sorted by name
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn plan(files: Vec<PathBuf>) -> Vec<Unit> {
    let mut units: Vec<Unit> = files
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Unit {
                source: SourceId::from_filename(&name),
                date: date_from_filename(&name),
                path,
                name,
            }
        })
        .collect();
    units.sort_by(|a, b| (a.date, &a.name).cmp(&(b.date, &b.name)));
    units
}

/// For latest-only runs: the newest-dated file per source, by index
fn newest_per_source(units: &[Unit]) -> HashMap<SourceId, usize> {
    let mut newest: HashMap<SourceId, usize> = HashMap::new();
    for (i, unit) in units.iter().enumerate() {
        let Ok(source) = &unit.source else { continue };
        let entry = newest.entry(*source).or_insert(i);
        let current = &units[*entry];
        if (unit.date, Reverse(&unit.name)) > (current.date, Reverse(&current.name)) {
            *entry = i;
        }
    }
    newest
}

// ── Execution ─────────────────────────────────────────────

/// Run the batch described by `config`
///
/// # Errors
/// Only run-level problems: an invalid configuration or an unreadable raw
/// directory. Per-unit failures are recorded in the report.
pub fn run(config: &Config) -> Result<RunReport> {
    let opts = config.normalize_options()?;
    let units = plan(discover(&config.raw_dir)?);
    info!(raw_dir = %config.raw_dir.display(), units = units.len(), "batch started");

    let newest = match config.naming {
        OutputNaming::Latest => Some(newest_per_source(&units)),
        OutputNaming::Dated => None,
    };

    // Dated outputs already written this run, by (source, date)
    let mut claimed: HashMap<(SourceId, NaiveDate), &str> = HashMap::new();

    let mut report = RunReport::default();
    for (i, unit) in units.iter().enumerate() {
        let base = UnitReport::pending(&unit.name, unit.source.as_ref().ok().copied(), unit.date);

        let source = match &unit.source {
            Ok(source) => *source,
            Err(err) => {
                warn!(file = %unit.name, "skipped: {}", err);
                report.push(base.with_error(err));
                continue;
            }
        };

        if let Some(newest) = &newest {
            if let Some(&keep) = newest.get(&source).filter(|&&keep| keep != i) {
                let mut skipped = base;
                skipped.reason = Some(format!("superseded by {}", units[keep].name));
                info!(file = %unit.name, "skipped: superseded");
                report.push(skipped);
                continue;
            }
        }

        let key = match (config.naming, unit.date) {
            (OutputNaming::Dated, Some(date)) => Some((source, date)),
            _ => None,
        };
        if let Some(first) = key.and_then(|k| claimed.get(&k)) {
            let mut skipped = base;
            skipped.reason = Some(format!("duplicate of {}", first));
            warn!(file = %unit.name, first = %first, "skipped: same source and date");
            report.push(skipped);
            continue;
        }

        let outcome = process_unit(unit, source, config, &opts, base);
        if let (Some(key), UnitStatus::Success) = (key, outcome.status) {
            claimed.insert(key, &unit.name);
        }
        report.push(outcome);
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "batch finished"
    );
    if let Some(path) = &config.report_path {
        report.write_json(path)?;
    }
    Ok(report)
}

fn process_unit(
    unit: &Unit,
    source: SourceId,
    config: &Config,
    opts: &NormalizeOptions,
    base: UnitReport,
) -> UnitReport {
    match clean_unit(unit, source, config, opts) {
        Ok((stats, written)) => {
            info!(
                file = %unit.name,
                source = %source,
                rows = stats.rows_kept,
                dropped = stats.rows_dropped(),
                "cleaned"
            );
            UnitReport {
                status: UnitStatus::Success,
                output: Some(written.path),
                sha256: Some(written.sha256),
                stats: Some(stats),
                ..base
            }
        }
        Err(err) => {
            match err.disposition() {
                Disposition::Skip => warn!(file = %unit.name, "skipped: {}", err),
                Disposition::Fail => warn!(file = %unit.name, "failed: {}", err),
            }
            base.with_error(&err)
        }
    }
}

fn clean_unit(
    unit: &Unit,
    source: SourceId,
    config: &Config,
    opts: &NormalizeOptions,
) -> Result<(NormalizeStats, Written)> {
    if config.naming == OutputNaming::Dated && unit.date.is_none() {
        return Err(Error::MissingReportDate(unit.name.clone()));
    }
    let raw = RawReport::from_path(&unit.path, Some(source))?;
    raw.check_payload(config.min_payload_bytes)?;

    let normalized = normalize(&raw, opts)?;
    if normalized.table.is_empty() {
        return Err(Error::EmptyTable(unit.name.clone()));
    }
    let written = write_table(&normalized.table, &config.out_dir, config.naming)?;
    Ok((normalized.stats, written))
}

#[cfg(test)]
mod tests {
    use encoding_rs::BIG5;

    use super::*;

    const T86: &str = "113年01月02日 三大法人買賣超日報\n\
\"證券代號\",\"外陸資買賣超股數(不含外資自營商)\",\"三大法人買賣超股數\"\n\
\"2330\",\"1,000\",\"500\"\n\"1101\",\"-\",\"20\"\n";

    fn write_big5(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), BIG5.encode(text).0).unwrap();
    }

    fn config(raw: &Path, out: &Path) -> Config {
        Config {
            raw_dir: raw.to_path_buf(),
            out_dir: out.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_dated_run_isolates_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        fs::create_dir(&raw).unwrap();
        write_big5(&raw, "20240102_t86.csv", T86);
        write_big5(&raw, "20240103_t86.csv", "title\n\"證券代號\",\"三大法人買賣超股數\"\n\"2330\",\"1\"\n");
        write_big5(&raw, "notes.csv", "x\n");
        fs::write(raw.join("readme.txt"), "ignored").unwrap();

        let report = run(&config(&raw, &tmp.path().join("out"))).unwrap();
        assert_eq!((report.succeeded, report.failed, report.skipped), (1, 1, 1));
        assert_eq!(report.total(), 3);
        assert_eq!(report.rows_kept, 2);
        assert_eq!(report.zero_coerced, 1);

        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed[0].file, "20240103_t86.csv");
        assert_eq!(failed[0].error_kind, Some("missing_required_column"));

        let ok = report.units.iter().find(|u| u.status == UnitStatus::Success).unwrap();
        assert!(ok.output.as_ref().unwrap().ends_with("20240102_t86.csv"));
        assert!(tmp.path().join("out/20240102_t86.csv").exists());
    }

    #[test]
    fn test_empty_result_fails_unit() {
        let tmp = tempfile::tempdir().unwrap();
        write_big5(tmp.path(), "20240102_t86.csv", "t\n\"證券代號\",\"外陸資買賣超股數(不含外資自營商)\",\"三大法人買賣超股數\"\n\"0050\",\"1\",\"1\"\n");
        let report = run(&config(tmp.path(), &tmp.path().join("out"))).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.units[0].error_kind, Some("empty_table"));
    }

    #[test]
    fn test_dated_naming_skips_undated_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_big5(tmp.path(), "cleaned_t86.csv", T86);
        let report = run(&config(tmp.path(), &tmp.path().join("out"))).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.units[0].error_kind, Some("missing_report_date"));
    }

    #[test]
    fn test_latest_naming_keeps_newest_per_source() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        fs::create_dir(&raw).unwrap();
        write_big5(&raw, "20240102_t86.csv", T86);
        write_big5(&raw, "20240103_t86.csv", T86);
        let out = tmp.path().join("out");
        let mut cfg = config(&raw, &out);
        cfg.naming = OutputNaming::Latest;
        cfg.report_path = Some(tmp.path().join("report.json"));

        let report = run(&cfg).unwrap();
        assert_eq!((report.succeeded, report.skipped), (1, 1));
        let ok = report.units.iter().find(|u| u.status == UnitStatus::Success).unwrap();
        assert_eq!(ok.file, "20240103_t86.csv");
        assert!(out.join("cleaned_t86.csv").exists());

        let json: serde_json::Value = serde_json::from_slice(&fs::read(tmp.path().join("report.json")).unwrap()).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["units"][0]["status"], "skipped");
    }

    const OTC_MARGIN: &str = "上櫃股票融資融券餘額\n資料日期:113/01/02\n\
代號,名稱,前資餘額,資買,資賣,現償,資餘額,前券餘額,券賣,券買,券償,券餘額\n";

    #[test]
    fn test_same_source_and_date_written_once() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        fs::create_dir(&raw).unwrap();
        write_big5(&raw, "20240102_margin_transactions.csv", &format!("{}1258,其祥,1,1,1,1,1,1,1,1,1,1\n", OTC_MARGIN));
        write_big5(&raw, "RSTA3106_1130102.csv", &format!("{}5483,中美晶,2,2,2,2,2,2,2,2,2,2\n", OTC_MARGIN));
        let out = tmp.path().join("out");

        let report = run(&config(&raw, &out)).unwrap();
        assert_eq!((report.succeeded, report.skipped), (1, 1));
        let ok = &report.units[0];
        assert_eq!(ok.file, "20240102_margin_transactions.csv");
        assert_eq!(ok.status, UnitStatus::Success);
        let dup = &report.units[1];
        assert_eq!(dup.file, "RSTA3106_1130102.csv");
        assert_eq!(dup.status, UnitStatus::Skipped);
        assert_eq!(dup.reason.as_deref(), Some("duplicate of 20240102_margin_transactions.csv"));
        assert!(dup.output.is_none());

        let written = fs::read_to_string(out.join("20240102_margin_transactions.csv")).unwrap();
        assert!(written.contains("1258,"));
        assert!(!written.contains("5483,"));
    }

    #[test]
    fn test_failed_unit_does_not_claim_its_date() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        fs::create_dir(&raw).unwrap();
        write_big5(&raw, "20240102_margin_transactions.csv", "no header anywhere\n1,2\n");
        write_big5(&raw, "RSTA3106_1130102.csv", &format!("{}5483,中美晶,2,2,2,2,2,2,2,2,2,2\n", OTC_MARGIN));

        let report = run(&config(&raw, &tmp.path().join("out"))).unwrap();
        assert_eq!((report.failed, report.succeeded), (1, 1));
        assert_eq!(report.units[1].status, UnitStatus::Success);
    }

    #[test]
    fn test_html_payload_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("20240102_t86.csv"), "<html><body>請稍後再試</body></html>").unwrap();
        let report = run(&config(tmp.path(), &tmp.path().join("out"))).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.units[0].error_kind, Some("invalid_payload"));
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        write_big5(tmp.path(), "20240102_t86.csv", T86);
        let cfg = config(tmp.path(), &tmp.path().join("out"));
        let first = run(&cfg).unwrap();
        let second = run(&cfg).unwrap();
        assert_eq!(first.units[0].sha256, second.units[0].sha256);
        assert!(first.units[0].sha256.is_some());
    }

    #[test]
    fn test_missing_raw_dir_is_run_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(run(&config(&tmp.path().join("absent"), tmp.path())).is_err());
    }
}
