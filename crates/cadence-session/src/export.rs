//! Serializable session snapshots.

use cadence_quality::GapRecord;
use cadence_types::{Bar, Interval, Quote};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{IntervalSeries, Registration, SymbolSession};

/// Which bars an export carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Every bar of every series. Leaves delta indices untouched.
    #[default]
    Complete,
    /// Only bars added since the previous delta export.
    Delta,
}

/// Point-in-time view of the whole session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Whether the store was active. An inactive store exports no symbols.
    pub active: bool,
    /// Trading date of the session.
    pub trading_date: Option<NaiveDate>,
    /// Export mode used.
    pub mode: ExportMode,
    /// One entry per symbol, ordered by symbol.
    pub symbols: Vec<SymbolSnapshot>,
}

impl SessionSnapshot {
    /// Snapshot returned while the store is inactive.
    #[must_use]
    pub const fn inactive(trading_date: Option<NaiveDate>, mode: ExportMode) -> Self {
        Self {
            active: false,
            trading_date,
            mode,
            symbols: Vec::new(),
        }
    }
}

/// Exported state of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSnapshot {
    /// The symbol.
    pub symbol: String,
    /// Streamed base interval.
    pub base_interval: Interval,
    /// How the symbol was registered.
    pub registration: Registration,
    /// Volume traded this session.
    pub session_volume: f64,
    /// Session high.
    pub session_high: Option<f64>,
    /// Session low.
    pub session_low: Option<f64>,
    /// Timestamp of the latest base bar.
    pub last_update: Option<DateTime<Utc>>,
    /// Latest quote.
    pub latest_quote: Option<Quote>,
    /// Current-session series, smallest interval first.
    pub series: Vec<SeriesSnapshot>,
}

/// Exported state of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    /// The series interval.
    pub interval: Interval,
    /// Interval the series is derived from, if derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_interval: Option<Interval>,
    /// Total bars held, regardless of mode.
    pub bar_count: usize,
    /// Quality percentage.
    pub quality: f64,
    /// Gap summary.
    pub gaps: GapSummary,
    /// Bars carried by this export.
    pub bars: Vec<Bar>,
}

/// Counts describing a series' gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapSummary {
    /// Gap records, open or filled.
    pub total: usize,
    /// Gaps not yet filled.
    pub open: usize,
    /// Bars missing across the open gaps.
    pub missing_bars: u64,
}

impl GapSummary {
    /// Summarizes `gaps`.
    #[must_use]
    pub fn of(gaps: &[GapRecord]) -> Self {
        gaps.iter().fold(Self::default(), |summary, gap| Self {
            total: summary.total + 1,
            open: summary.open + usize::from(gap.is_open()),
            missing_bars: summary.missing_bars + if gap.is_open() { gap.missing() } else { 0 },
        })
    }
}

impl SeriesSnapshot {
    fn new(series: &IntervalSeries, bars: Vec<Bar>) -> Self {
        Self {
            interval: series.interval(),
            source_interval: series.source_interval(),
            bar_count: series.len(),
            quality: series.quality(),
            gaps: GapSummary::of(series.gaps()),
            bars,
        }
    }
}

impl SymbolSnapshot {
    fn header(session: &SymbolSession, series: Vec<SeriesSnapshot>) -> Self {
        Self {
            symbol: session.symbol().to_string(),
            base_interval: session.base_interval(),
            registration: session.registration(),
            session_volume: session.session_volume(),
            session_high: session.session_high(),
            session_low: session.session_low(),
            last_update: session.last_update(),
            latest_quote: session.latest_quote().cloned(),
            series,
        }
    }

    /// Snapshot carrying every bar of every series.
    pub(crate) fn complete(session: &SymbolSession) -> Self {
        let series = session
            .all_series()
            .map(|series| SeriesSnapshot::new(series, series.bars().to_vec()))
            .collect();
        Self::header(session, series)
    }

    /// Snapshot carrying the bars added since the previous delta export.
    pub(crate) fn delta(session: &mut SymbolSession) -> Self {
        let series = session
            .all_series_mut()
            .map(|series| {
                let bars = series.take_delta().to_vec();
                SeriesSnapshot::new(series, bars)
            })
            .collect();
        Self::header(session, series)
    }
}
