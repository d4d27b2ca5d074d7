//! JSON bar files.
//!
//! Bar files hold one symbol/interval series each, either as a JSON array or
//! as newline-delimited JSON (one bar per line).

use std::io::{BufRead, Write};
use std::path::Path;

use cadence_types::{Bar, Interval};
use tracing::debug;

use crate::{InMemoryBarStore, StorageError};

/// JSON layout of a bar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    /// JSON array (standard JSON).
    #[default]
    Array,
    /// Newline-delimited JSON (NDJSON/JSONL).
    Ndjson,
}

impl JsonStyle {
    /// Picks the style from a file extension (`.ndjson`/`.jsonl` are NDJSON).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ndjson" | "jsonl") => Self::Ndjson,
            _ => Self::Array,
        }
    }
}

/// Reads bars from `reader`.
///
/// # Errors
///
/// Returns an error if the input is not valid JSON in the given style.
pub fn read_bars<R: BufRead>(reader: R, style: JsonStyle) -> Result<Vec<Bar>, StorageError> {
    match style {
        JsonStyle::Array => Ok(serde_json::from_reader(reader)?),
        JsonStyle::Ndjson => {
            let mut bars = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                bars.push(serde_json::from_str(&line)?);
            }
            Ok(bars)
        }
    }
}

/// Writes bars to `writer`.
///
/// # Errors
///
/// Returns an error if serialization or the underlying write fails.
pub fn write_bars<W: Write>(
    bars: &[Bar],
    mut writer: W,
    style: JsonStyle,
    pretty: bool,
) -> Result<(), StorageError> {
    match style {
        JsonStyle::Array => {
            if pretty {
                serde_json::to_writer_pretty(&mut writer, bars)?;
            } else {
                serde_json::to_writer(&mut writer, bars)?;
            }
            writeln!(writer)?;
        }
        JsonStyle::Ndjson => {
            for bar in bars {
                serde_json::to_writer(&mut writer, bar)?;
                writeln!(writer)?;
            }
        }
    }
    Ok(())
}

impl InMemoryBarStore {
    /// Loads a bar file into the store as `interval` bars.
    ///
    /// Bars are grouped by their `symbol` field, so one file may carry several
    /// symbols. Returns the number of bars loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a bar fails
    /// validation.
    pub fn load_json_file(&self, path: &Path, interval: Interval) -> Result<usize, StorageError> {
        let file = std::fs::File::open(path)?;
        let bars = read_bars(std::io::BufReader::new(file), JsonStyle::from_path(path))?;

        let mut by_symbol: std::collections::BTreeMap<String, Vec<Bar>> = Default::default();
        for bar in bars {
            by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }

        let mut loaded = 0;
        for (symbol, bars) in by_symbol {
            let count = self.insert(&symbol, interval, bars)?;
            debug!(
                symbol = %symbol,
                interval = %interval,
                count,
                path = %path.display(),
                "Loaded bars"
            );
            loaded += count;
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BarStore;
    use cadence_types::DateRange;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::io::Cursor;

    fn sample_bars() -> Vec<Bar> {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        vec![
            Bar::new("AAPL", ts, 185.0, 185.5, 184.8, 185.2, 1200.0),
            Bar::new("MSFT", ts, 370.0, 371.0, 369.5, 370.5, 900.0).with_trade_count(12),
        ]
    }

    #[test]
    fn test_json_array_round_trip() {
        let bars = sample_bars();
        let mut output = Cursor::new(Vec::new());
        write_bars(&bars, &mut output, JsonStyle::Array, false).unwrap();

        let text = String::from_utf8(output.get_ref().clone()).unwrap();
        assert!(text.starts_with('['));
        assert!(!text.contains("filled_from"));

        let parsed = read_bars(Cursor::new(output.into_inner()), JsonStyle::Array).unwrap();
        assert_eq!(parsed, bars);
    }

    #[test]
    fn test_ndjson_skips_blank_lines() {
        let bars = sample_bars();
        let mut output = Cursor::new(Vec::new());
        write_bars(&bars, &mut output, JsonStyle::Ndjson, false).unwrap();

        let mut text = String::from_utf8(output.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
        text.push('\n');

        let parsed = read_bars(Cursor::new(text.into_bytes()), JsonStyle::Ndjson).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_style_from_path() {
        assert_eq!(JsonStyle::from_path(Path::new("bars.jsonl")), JsonStyle::Ndjson);
        assert_eq!(JsonStyle::from_path(Path::new("bars.json")), JsonStyle::Array);
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minute.ndjson");
        let file = std::fs::File::create(&path).unwrap();
        write_bars(&sample_bars(), file, JsonStyle::Ndjson, false).unwrap();

        let store = InMemoryBarStore::new();
        let loaded = store.load_json_file(&path, Interval::ONE_MINUTE).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(store.symbols(), vec!["AAPL".to_string(), "MSFT".to_string()]);

        let day = DateRange::single_day(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let msft = store.get_bars("MSFT", Interval::ONE_MINUTE, day).unwrap();
        assert_eq!(msft[0].trade_count, Some(12));
    }
}
