use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use twreport_core::batch::{self, RunReport, UnitStatus};
use twreport_core::output::{self, OutputNaming};
use twreport_core::validation::{verify_output, Severity, VerificationResult};
use twreport_core::{normalize, Config, Error, NormalizeOptions, RawReport, SourceId};

/// twreport — Taiwan exchange report normalizer
///
/// Clean TWSE and TPEx report CSVs into canonical per-stock tables.
#[derive(Parser)]
#[command(name = "twreport", version, about, long_about = None)]
struct Cli {
    /// Log debug detail to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a single raw report
    Normalize {
        /// Path to the raw CSV
        file: PathBuf,
        /// Source id (inferred from the file name when omitted)
        #[arg(long)]
        source: Option<String>,
        /// Report date as YYYYMMDD (inferred from the file name when omitted)
        #[arg(long)]
        date: Option<String>,
        /// Header skip-row hint
        #[arg(long)]
        skip_rows: Option<usize>,
        /// Write the cleaned CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Reject payloads smaller than this many bytes
        #[arg(long, default_value_t = 0)]
        min_bytes: usize,
        /// Print normalization stats as JSON
        #[arg(long)]
        json: bool,
    },

    /// Normalize every raw report in a directory
    Batch {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Keep only the newest file per source, written as cleaned_{source}.csv
        #[arg(long)]
        latest: bool,
        /// Write the JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify cleaned output files
    Verify {
        /// A cleaned CSV, or a directory of them
        path: PathBuf,
        /// Source id (inferred from each file name when omitted)
        #[arg(long)]
        source: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List supported report formats
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Normalize {
            file,
            source,
            date,
            skip_rows,
            output,
            min_bytes,
            json,
        } => report_error(cmd_normalize(
            &file,
            NormalizeArgs {
                source: source.as_deref(),
                date: date.as_deref(),
                skip_rows,
                output: output.as_deref(),
                min_bytes,
                json,
            },
        )),
        Commands::Batch {
            config,
            raw_dir,
            out_dir,
            latest,
            report,
            json,
        } => report_error(cmd_batch(config.as_deref(), raw_dir, out_dir, latest, report, json)),
        Commands::Verify { path, source, json } => report_error(cmd_verify(&path, source.as_deref(), json)),
        Commands::Formats { json } => report_error(cmd_formats(json)),
        Commands::Version => {
            println!("twreport {} (twreport-core {})", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_VERSION"));
            0
        }
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "twreport_core=debug,twreport_cli=debug"
    } else {
        "twreport_core=info,twreport_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let layer = fmt::layer().with_writer(io::stderr).with_target(false);
    // Ignore a subscriber that is already installed
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}

/// Exit 2 for errors that stop a command before it can report results
fn report_error(result: twreport_core::Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            2
        }
    }
}

fn parse_source(tag: Option<&str>) -> twreport_core::Result<Option<SourceId>> {
    tag.map(str::parse).transpose()
}

// ── normalize ─────────────────────────────────────────────

struct NormalizeArgs<'a> {
    source: Option<&'a str>,
    date: Option<&'a str>,
    skip_rows: Option<usize>,
    output: Option<&'a Path>,
    min_bytes: usize,
    json: bool,
}

fn cmd_normalize(file: &Path, args: NormalizeArgs<'_>) -> twreport_core::Result<i32> {
    let NormalizeArgs {
        source,
        date,
        skip_rows,
        output: out_path,
        min_bytes,
        json,
    } = args;
    let mut raw = RawReport::from_path(file, parse_source(source)?)?;
    if let Some(date) = date {
        let date = NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|_| Error::Config(format!("--date {:?} is not YYYYMMDD", date)))?;
        raw = raw.with_date(date);
    }
    if let Some(rows) = skip_rows {
        raw = raw.with_header_offset(rows);
    }
    raw.check_payload(min_bytes)?;

    let normalized = normalize(&raw, &NormalizeOptions::default())?;
    let bytes = output::to_csv_bytes(&normalized.table)?;

    match out_path {
        Some(path) => fs::write(path, &bytes)?,
        None if !json => io::stdout().write_all(&bytes)?,
        None => {}
    }

    if json {
        let summary = serde_json::json!({
            "file": raw.label,
            "source": normalized.table.source,
            "report_date": normalized.table.report_date,
            "rows": normalized.table.len(),
            "sha256": output::digest(&bytes),
            "stats": normalized.stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if normalized.table.is_empty() {
        eprintln!("{} {}", "error:".red().bold(), Error::EmptyTable(raw.label));
        return Ok(1);
    }
    Ok(0)
}

// ── batch ─────────────────────────────────────────────────

fn cmd_batch(
    config: Option<&Path>,
    raw_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    latest: bool,
    report: Option<PathBuf>,
    json: bool,
) -> twreport_core::Result<i32> {
    let mut config = match config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = raw_dir {
        config.raw_dir = dir;
    }
    if let Some(dir) = out_dir {
        config.out_dir = dir;
    }
    if latest {
        config.naming = OutputNaming::Latest;
    }
    if report.is_some() {
        config.report_path = report;
    }
    config.validate()?;
    tracing::debug!(
        raw_dir = %config.raw_dir.display(),
        out_dir = %config.out_dir.display(),
        naming = ?config.naming,
        "batch configuration"
    );

    let run = batch::run(&config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run_summary(&run);
    }
    Ok(if run.has_failures() { 1 } else { 0 })
}

fn print_run_summary(run: &RunReport) {
    for unit in &run.units {
        let mark = match unit.status {
            UnitStatus::Success => "✓".green(),
            UnitStatus::Failed => "✗".red(),
            UnitStatus::Skipped => "–".yellow(),
        };
        match (&unit.stats, &unit.reason) {
            (Some(stats), _) => println!(
                "{} {} ({} rows, {} dropped)",
                mark,
                unit.file,
                stats.rows_kept,
                stats.rows_dropped()
            ),
            (None, Some(reason)) => println!("{} {}: {}", mark, unit.file, reason),
            (None, None) => println!("{} {}", mark, unit.file),
        }
    }

    println!();
    println!(
        "{} {} succeeded, {} failed, {} skipped",
        "Summary:".bold(),
        run.succeeded.to_string().green(),
        run.failed.to_string().red(),
        run.skipped.to_string().yellow()
    );
    println!(
        "         {} rows kept, {} dropped, {} duplicates, {} cells zero-filled",
        run.rows_kept, run.rows_dropped, run.duplicates, run.zero_coerced
    );
}

// ── verify ────────────────────────────────────────────────

fn cmd_verify(path: &Path, source: Option<&str>, json: bool) -> twreport_core::Result<i32> {
    let source = parse_source(source)?;
    let files = if path.is_dir() {
        batch::discover(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut results: Vec<(String, VerificationResult)> = Vec::with_capacity(files.len());
    for file in &files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_source = source.or_else(|| SourceId::from_filename(&name).ok());
        let bytes = fs::read(file)?;
        results.push((name, verify_output(&bytes, file_source)));
    }

    let all_valid = results.iter().all(|(_, r)| r.is_valid());
    if json {
        let out: Vec<_> = results
            .iter()
            .map(|(name, r)| {
                serde_json::json!({
                    "file": name,
                    "valid": r.is_valid(),
                    "rows": r.rows,
                    "diagnostics": r.diagnostics,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (name, result) in &results {
            if result.is_valid() {
                println!("{} {}: valid ({} rows)", "✓".green(), name, result.rows);
            } else {
                println!("{} {}: invalid", "✗".red(), name);
            }
            for d in &result.diagnostics {
                match d.severity {
                    Severity::Error => println!("    {}", d.to_string().red()),
                    Severity::Warning => println!("    {}", d.to_string().yellow()),
                }
            }
        }
    }
    Ok(if all_valid { 0 } else { 1 })
}

// ── formats ───────────────────────────────────────────────

fn cmd_formats(json: bool) -> twreport_core::Result<i32> {
    if json {
        let out: Vec<_> = SourceId::ALL
            .iter()
            .map(|id| {
                let spec = id.spec();
                serde_json::json!({
                    "source": id,
                    "market": id.market(),
                    "description": spec.description,
                    "skip_hint": spec.skip_hint,
                    "header_needles": spec.header_needles,
                    "fields": spec.field_names(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(0);
    }

    for id in SourceId::ALL {
        let spec = id.spec();
        println!("{:<22} {:<5} {}", id.as_str().bold(), id.market().to_string(), spec.description);
        println!("{:<28} fields: {}", "", spec.field_names().join(", "));
    }
    Ok(0)
}
