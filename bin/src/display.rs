//! Display utilities, data loading and output for the cadence CLI.

use anyhow::{Context, Result};
use cadence_lib::{ExportMode, InMemoryBarStore, Interval};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Snapshot contents for `run --export`.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum SnapshotMode {
    Complete,
    Delta,
}

impl From<SnapshotMode> for ExportMode {
    fn from(mode: SnapshotMode) -> Self {
        match mode {
            SnapshotMode::Complete => Self::Complete,
            SnapshotMode::Delta => Self::Delta,
        }
    }
}

/// Installs the tracing subscriber. `RUST_LOG` wins over the flags.
pub(crate) fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to install logger")
}

/// Splits a bar file name such as `AAPL_1m.ndjson` into symbol and interval.
pub(crate) fn parse_file_name(path: &Path) -> Option<(String, Interval)> {
    let extension = path.extension()?.to_str()?;
    if !matches!(extension, "json" | "ndjson" | "jsonl") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (symbol, interval) = stem.rsplit_once('_')?;
    if symbol.is_empty() {
        return None;
    }
    Some((symbol.to_string(), interval.parse().ok()?))
}

/// Loads every bar file in `dir` into an in-memory store.
///
/// Returns the store and, per file, the symbol, interval and bar count.
pub(crate) fn load_data_dir(
    dir: &Path,
) -> Result<(InMemoryBarStore, Vec<(String, Interval, usize)>)> {
    let store = InMemoryBarStore::new();
    let mut loaded = Vec::new();

    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read data directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    paths.sort();

    for path in paths {
        let Some((symbol, interval)) = parse_file_name(&path) else {
            tracing::debug!(
                path = %path.display(),
                "Skipping file without a <SYMBOL>_<interval> name"
            );
            continue;
        };
        let count = store
            .load_json_file(&path, interval)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        tracing::info!(symbol = %symbol, %interval, count, "Loaded bar file");
        loaded.push((symbol, interval, count));
    }

    Ok((store, loaded))
}

/// Writes `value` as pretty JSON to `output`, or to stdout.
pub(crate) fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Progress bar over trading days.
pub(crate) fn day_progress(days: u64, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(days);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} days \
                 ({percent}%) {msg}",
            )
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_file_name() {
        let parsed = parse_file_name(Path::new("data/AAPL_1m.ndjson"));
        assert_eq!(parsed, Some(("AAPL".to_string(), Interval::ONE_MINUTE)));

        let parsed = parse_file_name(Path::new("BRK_B_1d.json"));
        assert_eq!(parsed, Some(("BRK_B".to_string(), Interval::ONE_DAY)));

        assert_eq!(parse_file_name(Path::new("AAPL_1m.csv")), None);
        assert_eq!(parse_file_name(Path::new("AAPL.json")), None);
        assert_eq!(parse_file_name(Path::new("AAPL_0m.json")), None);
    }

    #[test]
    fn test_load_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bars = concat!(
            r#"{"symbol":"AAPL","timestamp":"2024-01-02T14:30:00Z","#,
            r#""open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0}"#,
            "\n",
            r#"{"symbol":"AAPL","timestamp":"2024-01-02T14:31:00Z","#,
            r#""open":1.5,"high":2.0,"low":1.0,"close":1.8,"volume":12.0}"#,
            "\n",
        );
        fs::write(dir.path().join("AAPL_1m.ndjson"), bars).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (store, loaded) = load_data_dir(dir.path()).unwrap();
        assert_eq!(loaded, vec![("AAPL".to_string(), Interval::ONE_MINUTE, 2)]);
        assert_eq!(store.intervals("AAPL"), vec![Interval::ONE_MINUTE]);

        let missing = load_data_dir(&PathBuf::from("/nonexistent/cadence"));
        assert!(missing.is_err());
    }
}
