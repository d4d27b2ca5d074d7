//! Per-symbol session state.

use std::collections::BTreeMap;

use cadence_quality::GapRecord;
use cadence_types::{Bar, Interval, Quote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::IntervalSeries;

/// How a symbol entered the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    /// Registered from the session configuration or via the coordinator,
    /// with history and derived intervals.
    Full,
    /// Created on demand for a single interval without history.
    AutoProvisioned,
}

/// Everything the session holds for one symbol.
///
/// `series` holds the current session, `history` the trailing-window load for
/// each requested interval. Dropping the session drops every series it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSession {
    symbol: String,
    base_interval: Interval,
    registration: Registration,
    series: BTreeMap<Interval, IntervalSeries>,
    history: BTreeMap<Interval, IntervalSeries>,
    session_volume: f64,
    session_high: Option<f64>,
    session_low: Option<f64>,
    last_update: Option<DateTime<Utc>>,
    latest_quote: Option<Quote>,
}

impl SymbolSession {
    /// Creates a session streaming `base_interval`.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        base_interval: Interval,
        registration: Registration,
    ) -> Self {
        let mut series = BTreeMap::new();
        series.insert(base_interval, IntervalSeries::base(base_interval));
        Self {
            symbol: symbol.into(),
            base_interval,
            registration,
            series,
            history: BTreeMap::new(),
            session_volume: 0.0,
            session_high: None,
            session_low: None,
            last_update: None,
            latest_quote: None,
        }
    }

    /// Adds a series derived from the base interval.
    ///
    /// Returns false if the interval is already tracked.
    pub fn add_derived(&mut self, interval: Interval) -> bool {
        if self.series.contains_key(&interval) {
            return false;
        }
        self.series
            .insert(interval, IntervalSeries::derived(interval, self.base_interval));
        true
    }

    /// Returns the symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Returns the streamed base interval.
    #[must_use]
    pub const fn base_interval(&self) -> Interval {
        self.base_interval
    }

    /// Returns how the symbol was registered.
    #[must_use]
    pub const fn registration(&self) -> Registration {
        self.registration
    }

    /// Returns the current-session series for `interval`.
    #[must_use]
    pub fn series(&self, interval: Interval) -> Option<&IntervalSeries> {
        self.series.get(&interval)
    }

    /// Returns the current-session series for `interval` mutably.
    pub fn series_mut(&mut self, interval: Interval) -> Option<&mut IntervalSeries> {
        self.series.get_mut(&interval)
    }

    /// Returns the base series.
    #[must_use]
    pub fn base(&self) -> Option<&IntervalSeries> {
        self.series.get(&self.base_interval)
    }

    /// Iterates over the current-session series in interval order.
    pub fn all_series(&self) -> impl Iterator<Item = &IntervalSeries> {
        self.series.values()
    }

    /// Iterates mutably over the current-session series.
    pub fn all_series_mut(&mut self) -> impl Iterator<Item = &mut IntervalSeries> {
        self.series.values_mut()
    }

    /// Returns the tracked intervals, smallest first.
    #[must_use]
    pub fn intervals(&self) -> Vec<Interval> {
        self.series.keys().copied().collect()
    }

    /// Returns the historical series for `interval`.
    #[must_use]
    pub fn history(&self, interval: Interval) -> Option<&IntervalSeries> {
        self.history.get(&interval)
    }

    /// Stores the trailing-window historical series, replacing any previous one.
    pub fn set_history(&mut self, series: IntervalSeries) {
        self.history.insert(series.interval(), series);
    }

    /// Iterates over the historical series.
    pub fn all_history(&self) -> impl Iterator<Item = &IntervalSeries> {
        self.history.values()
    }

    /// Appends a base bar and updates the session rollups.
    ///
    /// Returns false if the base series rejected the bar.
    pub fn record_base_bar(&mut self, bar: Bar) -> bool {
        let timestamp = bar.timestamp;
        let (volume, high, low) = (bar.volume, bar.high, bar.low);
        let Some(series) = self.series.get_mut(&self.base_interval) else {
            return false;
        };
        if !series.push(bar) {
            return false;
        }
        self.roll_up(volume, high, low);
        self.last_update = Some(timestamp);
        true
    }

    /// Merges gap fill bars into `interval` and marks the gap of `record`
    /// filled.
    ///
    /// Bars already held are skipped. Base fills count toward the session
    /// rollups. Returns the number of bars inserted.
    pub fn apply_fill(&mut self, interval: Interval, record: GapRecord, bars: Vec<Bar>) -> usize {
        let Some(series) = self.series.get(&interval) else {
            return 0;
        };
        let fresh: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| {
                series
                    .bars()
                    .binary_search_by_key(&bar.timestamp, |held| held.timestamp)
                    .is_err()
            })
            .collect();
        if interval == self.base_interval {
            for bar in &fresh {
                self.roll_up(bar.volume, bar.high, bar.low);
            }
        }

        let Some(series) = self.series.get_mut(&interval) else {
            return 0;
        };
        let inserted = series.insert_filled(fresh);
        series.resolve_gap(record);
        inserted
    }

    fn roll_up(&mut self, volume: f64, high: f64, low: f64) {
        self.session_volume += volume;
        self.session_high = Some(self.session_high.map_or(high, |held| held.max(high)));
        self.session_low = Some(self.session_low.map_or(low, |held| held.min(low)));
    }

    /// Appends a derived bar to its series.
    ///
    /// Returns false if the interval is not tracked or the bar is out of order.
    pub fn record_derived_bar(&mut self, interval: Interval, bar: Bar) -> bool {
        self.series
            .get_mut(&interval)
            .is_some_and(|series| series.push(bar))
    }

    /// Returns the volume traded this session.
    #[must_use]
    pub const fn session_volume(&self) -> f64 {
        self.session_volume
    }

    /// Returns the session high.
    #[must_use]
    pub const fn session_high(&self) -> Option<f64> {
        self.session_high
    }

    /// Returns the session low.
    #[must_use]
    pub const fn session_low(&self) -> Option<f64> {
        self.session_low
    }

    /// Returns the timestamp of the latest base bar.
    #[must_use]
    pub const fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Returns the latest quote.
    #[must_use]
    pub const fn latest_quote(&self) -> Option<&Quote> {
        self.latest_quote.as_ref()
    }

    /// Replaces the latest quote.
    pub fn set_quote(&mut self, quote: Quote) {
        self.latest_quote = Some(quote);
    }
}
