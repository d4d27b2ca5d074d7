//! Historical loading with fallback and gap filling.

use std::sync::Arc;

use cadence_aggregate::AggregationRequest;
use cadence_calendar::TradingCalendar;
use cadence_quality::{GapEngine, GapRecord, QualityError};
use cadence_storage::{AvailabilityProbe, AvailabilityReport, BarStore};
use cadence_types::{Bar, DateRange, Interval};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::{DetermineError, SourcePath, StreamDeterminer};

/// Bars loaded for one historical interval.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalLoad {
    /// Symbol loaded.
    pub symbol: String,
    /// Path the bars were produced by.
    pub path: SourcePath,
    /// Bars in ascending timestamp order.
    pub bars: Vec<Bar>,
    /// Quality over the requested range.
    pub quality: f64,
    /// Gaps found in a direct load, filled ones included.
    pub gaps: Vec<GapRecord>,
}

impl HistoricalLoad {
    /// Returns the interval loaded.
    #[must_use]
    pub fn target(&self) -> Interval {
        self.path.target()
    }

    /// Returns the interval the bars were derived from, if not loaded directly.
    #[must_use]
    pub fn derived_from(&self) -> Option<Interval> {
        (!self.path.is_direct()).then(|| self.path.source())
    }
}

/// Loads historical bars, falling back to smaller stored intervals.
///
/// A stored target is loaded as is, and each of its gaps is offered to a
/// fill from the next smaller stored interval. Otherwise every candidate path
/// is tried in priority order: the storage read and every aggregation stage
/// must pass the 100% completeness gate over the requested range, or the
/// candidate is abandoned.
#[derive(Debug, Clone)]
pub struct HistoricalLoader {
    store: Arc<dyn BarStore>,
    probe: AvailabilityProbe,
    engine: GapEngine,
    determiner: StreamDeterminer,
}

impl HistoricalLoader {
    /// Creates a loader over `store` using `calendar` for completeness.
    #[must_use]
    pub fn new(store: Arc<dyn BarStore>, calendar: Arc<dyn TradingCalendar>) -> Self {
        Self {
            probe: AvailabilityProbe::new(Arc::clone(&store))
                .with_calendar(Arc::clone(&calendar)),
            store,
            engine: GapEngine::new(calendar),
            determiner: StreamDeterminer::new(),
        }
    }

    /// Returns the availability probe.
    #[must_use]
    pub const fn probe(&self) -> &AvailabilityProbe {
        &self.probe
    }

    /// Returns the gap engine.
    #[must_use]
    pub const fn engine(&self) -> &GapEngine {
        &self.engine
    }

    /// Reads `interval` bars whose exchange trading date falls in `range`.
    ///
    /// # Errors
    ///
    /// Propagates calendar and storage errors.
    pub fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<Vec<Bar>, DetermineError> {
        let (start, end) = self.engine.calendar().range_window(range)?;
        Ok(self.store.get_bars_between(symbol, interval, start, end)?)
    }

    /// Returns the first session open and the last instant before the last
    /// session close in `range`, or `None` if no trading day falls in it.
    ///
    /// # Errors
    ///
    /// Propagates calendar errors.
    pub fn session_window(
        &self,
        range: DateRange,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, DetermineError> {
        let calendar = self.engine.calendar();
        let days = calendar.trading_days(range)?;
        let (Some(first), Some(last)) = (days.first(), days.last()) else {
            return Ok(None);
        };
        let open = calendar.session_bounds(*first)?.map(|bounds| bounds.open);
        let close = calendar.session_bounds(*last)?.map(|bounds| bounds.close);
        Ok(match (open, close) {
            (Some(open), Some(close)) => Some((open, close - TimeDelta::seconds(1))),
            _ => None,
        })
    }

    /// Loads `target` bars for `symbol` over `range`.
    ///
    /// # Errors
    ///
    /// Returns [`DetermineError::NoBaseIntervalAvailable`] if nothing is
    /// stored for the symbol, [`DetermineError::NoViableSource`] if every
    /// candidate was missing or incomplete, and propagates collaborator
    /// failures.
    pub fn load(
        &self,
        symbol: &str,
        target: Interval,
        range: DateRange,
    ) -> Result<HistoricalLoad, DetermineError> {
        let report = self.probe.probe(symbol, range, &[target])?;
        if report.stored().is_empty() {
            return Err(DetermineError::NoBaseIntervalAvailable {
                symbol: symbol.to_string(),
            });
        }

        let plan = self.determiner.plan_historical(target, &report);
        let window = self.session_window(range)?;
        for path in &plan.candidates {
            let load = if path.is_direct() {
                Some(self.load_direct(symbol, target, range, window, &report)?)
            } else {
                self.load_staged(symbol, path, range, window)?
            };
            if let Some(load) = load {
                info!(
                    symbol,
                    %target,
                    path = %load.path,
                    bars = load.bars.len(),
                    quality = load.quality,
                    "Loaded history"
                );
                return Ok(load);
            }
        }

        Err(DetermineError::NoViableSource {
            symbol: symbol.to_string(),
            interval: target,
            tried: plan.candidates.len(),
        })
    }

    fn load_direct(
        &self,
        symbol: &str,
        target: Interval,
        range: DateRange,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
        report: &AvailabilityReport,
    ) -> Result<HistoricalLoad, DetermineError> {
        let mut bars = self.fetch(symbol, target, range)?;
        let path = SourcePath::direct(target);
        let Some((start, end)) = window else {
            return Ok(HistoricalLoad {
                symbol: symbol.to_string(),
                path,
                bars,
                quality: 100.0,
                gaps: Vec::new(),
            });
        };

        let fillers = fillers(report, target);
        let found = self.engine.detect_gaps_in_window(&bars, target, start, end)?;
        let mut gaps = Vec::with_capacity(found.len());
        for gap in found {
            match self.fill(symbol, &gap, target, &fillers)? {
                Some((record, filled)) => {
                    bars.extend(filled);
                    gaps.push(record);
                }
                None => gaps.push(gap),
            }
        }
        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by_key(|bar| bar.timestamp);

        let quality = self.engine.quality(&bars, target, start, end)?;
        Ok(HistoricalLoad {
            symbol: symbol.to_string(),
            path,
            bars,
            quality,
            gaps,
        })
    }

    /// Fills an open `gap` of a `target` series from the largest smaller
    /// stored interval that covers it completely.
    ///
    /// Returns the resolved record and the fill bars, or `None` if nothing
    /// stored can fill it.
    ///
    /// # Errors
    ///
    /// Propagates collaborator failures.
    pub fn fill_open_gap(
        &self,
        symbol: &str,
        target: Interval,
        gap: &GapRecord,
    ) -> Result<Option<(GapRecord, Vec<Bar>)>, DetermineError> {
        let calendar = self.engine.calendar();
        let first = calendar.trading_date(gap.start());
        let last = calendar.trading_date(gap.end() - TimeDelta::seconds(1));
        let Ok(range) = DateRange::new(first, last) else {
            return Ok(None);
        };
        let report = self.probe.probe(symbol, range, &[])?;
        self.fill(symbol, gap, target, &fillers(&report, target))
    }

    fn fill(
        &self,
        symbol: &str,
        gap: &GapRecord,
        target: Interval,
        fillers: &[Interval],
    ) -> Result<Option<(GapRecord, Vec<Bar>)>, DetermineError> {
        for from in fillers {
            let from_bars = self
                .store
                .get_bars_between(symbol, *from, gap.start(), gap.end())?;
            match self.engine.fill_gap(gap, target, *from, &from_bars) {
                Ok(fill) => return Ok(Some((fill.record, fill.bars))),
                Err(QualityError::IncompleteSource { quality, .. }) => {
                    debug!(
                        symbol,
                        %target,
                        %from,
                        quality,
                        start = %gap.start(),
                        "Gap fill rejected"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    fn load_staged(
        &self,
        symbol: &str,
        path: &SourcePath,
        range: DateRange,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Option<HistoricalLoad>, DetermineError> {
        let mut interval = path.source();
        let mut bars = self.fetch(symbol, interval, range)?;
        if !self.passes_gate(symbol, path, &bars, interval, window)? {
            return Ok(None);
        }

        for stage in &path.stages()[1..] {
            let request = AggregationRequest::new(symbol, interval, *stage);
            bars = self.engine.aggregator().aggregate(&bars, &request)?;
            interval = *stage;
            if !self.passes_gate(symbol, path, &bars, interval, window)? {
                return Ok(None);
            }
        }

        Ok(Some(HistoricalLoad {
            symbol: symbol.to_string(),
            path: path.clone(),
            bars,
            quality: 100.0,
            gaps: Vec::new(),
        }))
    }

    fn passes_gate(
        &self,
        symbol: &str,
        path: &SourcePath,
        bars: &[Bar],
        interval: Interval,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<bool, DetermineError> {
        let Some((start, end)) = window else {
            return Ok(true);
        };
        match self.engine.require_complete(bars, interval, start, end) {
            Ok(_) => Ok(true),
            Err(QualityError::IncompleteSource { quality, gaps }) => {
                debug!(
                    symbol,
                    %path,
                    %interval,
                    quality,
                    gaps = gaps.len(),
                    "Abandoning incomplete source"
                );
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Stored intervals that can fill a `target` gap, largest first.
fn fillers(report: &AvailabilityReport, target: Interval) -> Vec<Interval> {
    report
        .stored()
        .into_iter()
        .rev()
        .filter(|from| *from < target && StreamDeterminer::can_derive(*from, target))
        .collect()
}
