//! Bar storage interface and the in-memory reference store.

use std::collections::HashMap;

use cadence_calendar::CalendarError;
use cadence_types::{Bar, BarError, CadenceError, DateRange, Interval};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether storage holds an interval for a symbol, and over which dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// True if at least one bar exists in the queried range.
    pub present: bool,
    /// First and last dates with stored bars inside the queried range.
    pub coverage: Option<DateRange>,
}

impl Availability {
    /// Nothing stored.
    pub const ABSENT: Self = Self {
        present: false,
        coverage: None,
    };

    /// Returns true if the stored coverage spans the whole `range`.
    #[must_use]
    pub fn covers(&self, range: &DateRange) -> bool {
        self.coverage.is_some_and(|coverage| coverage.covers(range))
    }
}

/// Errors that can occur reading or writing stored bars.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored bar failed validation.
    #[error("Invalid bar for {symbol} at record {index}: {source}")]
    InvalidBar {
        /// Symbol of the offending bar.
        symbol: String,
        /// Position of the bar in its input.
        index: usize,
        /// Validation failure.
        source: BarError,
    },

    /// Trading dates could not be mapped to UTC instants.
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// The storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for CadenceError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Read access to persisted bars.
///
/// Implementations must be safe to call from any thread; the session engine
/// treats every call as a stateless read.
pub trait BarStore: Send + Sync + std::fmt::Debug {
    /// Returns all stored bars of `interval` for `symbol` whose date falls
    /// inside `range`, in ascending timestamp order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<Vec<Bar>, StorageError>;

    /// Reports whether `interval` is stored for `symbol` within `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn check_availability(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<Availability, StorageError>;

    /// Returns all stored bars of `interval` for `symbol` with a timestamp in
    /// `[start, end)`, in ascending timestamp order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_bars_between(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StorageError>;

    /// Returns the first and last stored timestamps in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn stored_span(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, StorageError>;
}

type SeriesKey = (String, Interval);

/// Thread-safe in-memory [`BarStore`].
///
/// Bars are kept per `(symbol, interval)` sorted by timestamp, one bar per
/// timestamp. Date filtering uses each bar's UTC date; the `_between`
/// reads take a UTC window.
#[derive(Debug, Default)]
pub struct InMemoryBarStore {
    series: RwLock<HashMap<SeriesKey, Vec<Bar>>>,
}

impl InMemoryBarStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts bars for `symbol` at `interval`.
    ///
    /// Bars with a timestamp already present replace the stored bar.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidBar`] if any bar fails validation; in
    /// that case nothing is inserted.
    pub fn insert(
        &self,
        symbol: &str,
        interval: Interval,
        bars: impl IntoIterator<Item = Bar>,
    ) -> Result<usize, StorageError> {
        let incoming: Vec<Bar> = bars.into_iter().collect();
        for (index, bar) in incoming.iter().enumerate() {
            bar.validate().map_err(|source| StorageError::InvalidBar {
                symbol: symbol.to_string(),
                index,
                source,
            })?;
        }

        let inserted = incoming.len();
        let mut series = self.series.write();
        let stored = series.entry((symbol.to_string(), interval)).or_default();
        // Later bars win on duplicate timestamps: stable sort keeps input
        // order, then dedup keeps the last of each run.
        stored.extend(incoming);
        stored.sort_by_key(|bar| bar.timestamp);
        let mut deduped: Vec<Bar> = Vec::with_capacity(stored.len());
        for bar in stored.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        *stored = deduped;
        Ok(inserted)
    }

    /// Returns the intervals stored for `symbol`, smallest first.
    #[must_use]
    pub fn intervals(&self, symbol: &str) -> Vec<Interval> {
        let mut intervals: Vec<Interval> = self
            .series
            .read()
            .keys()
            .filter(|(stored, _)| stored == symbol)
            .map(|(_, interval)| *interval)
            .collect();
        intervals.sort();
        intervals
    }

    /// Returns every stored symbol, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .series
            .read()
            .keys()
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Returns the total number of stored bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.read().values().map(Vec::len).sum()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn in_range(bar: &Bar, range: &DateRange) -> bool {
    range.contains(bar.timestamp.date_naive())
}

// Stored series are sorted, so a window is a contiguous slice.
fn window(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
    let from = bars.partition_point(|bar| bar.timestamp < start);
    let to = bars.partition_point(|bar| bar.timestamp < end).max(from);
    &bars[from..to]
}

impl BarStore for InMemoryBarStore {
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<Vec<Bar>, StorageError> {
        let series = self.series.read();
        Ok(series
            .get(&(symbol.to_string(), interval))
            .map(|bars| {
                bars.iter()
                    .filter(|bar| in_range(bar, &range))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn check_availability(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<Availability, StorageError> {
        let series = self.series.read();
        let Some(bars) = series.get(&(symbol.to_string(), interval)) else {
            return Ok(Availability::ABSENT);
        };

        let mut dates = bars
            .iter()
            .filter(|bar| in_range(bar, &range))
            .map(|bar| bar.timestamp.date_naive());
        let Some(first) = dates.next() else {
            return Ok(Availability::ABSENT);
        };
        let last: NaiveDate = dates.last().unwrap_or(first);
        let coverage = DateRange::new(first, last).ok();
        Ok(Availability {
            present: coverage.is_some(),
            coverage,
        })
    }

    fn get_bars_between(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, StorageError> {
        let series = self.series.read();
        Ok(series
            .get(&(symbol.to_string(), interval))
            .map(|bars| window(bars, start, end).to_vec())
            .unwrap_or_default())
    }

    fn stored_span(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, StorageError> {
        let series = self.series.read();
        Ok(series
            .get(&(symbol.to_string(), interval))
            .map(|bars| window(bars, start, end))
            .and_then(|bars| Some((bars.first()?.timestamp, bars.last()?.timestamp))))
    }
}
