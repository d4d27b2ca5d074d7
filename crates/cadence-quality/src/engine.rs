//! Expected-count model, gap detection and the completeness gate.

use std::collections::BTreeSet;
use std::sync::Arc;

use cadence_aggregate::{AggregateError, AggregationRequest, BarAggregator};
use cadence_calendar::{CalendarError, SessionBounds, TradingCalendar};
use cadence_types::{Bar, CadenceError, DateRange, Interval, IntervalUnit};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::GapRecord;

/// Errors raised by the gap engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityError {
    /// The source window is not 100% complete.
    #[error("Incomplete source data: quality {quality:.2}%, {} gap(s)", .gaps.len())]
    IncompleteSource {
        /// Quality of the window, in percent.
        quality: f64,
        /// Gaps found in the window.
        gaps: Vec<GapRecord>,
    },

    /// A calendar lookup failed.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Aggregating the fill source failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl From<QualityError> for CadenceError {
    fn from(err: QualityError) -> Self {
        match err {
            QualityError::IncompleteSource { quality, .. } => Self::IncompleteSource { quality },
            QualityError::Calendar(err) => err.into(),
            QualityError::Aggregate(err) => err.into(),
        }
    }
}

/// Completeness of a bar series over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// Bars the calendar expects in the window.
    pub expected: u64,
    /// Bars present in the window.
    pub actual: u64,
    /// `100 * actual / expected`, clamped to `[0, 100]`; 100 when nothing is expected.
    pub quality: f64,
    /// Leading, internal and trailing gaps in the window.
    pub gaps: Vec<GapRecord>,
}

impl QualityReport {
    /// Returns true if the window is exactly 100% complete with no gaps.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.quality >= 100.0 && self.gaps.is_empty()
    }
}

/// A gap resolved from a smaller interval.
#[derive(Debug, Clone, PartialEq)]
pub struct GapFill {
    /// The gap record with `filled_from` set.
    pub record: GapRecord,
    /// The synthesized bars, tagged with `filled_from`.
    pub bars: Vec<Bar>,
}

/// Detects missing bars against the calendar's expected-count model.
///
/// Intraday slots run from the session open to `close - duration` on a grid
/// anchored at the open. Day intervals count trading days, week intervals
/// count weeks with at least one trading day, and multi-unit intervals count
/// `ceil(units / multiplier)`.
#[derive(Debug, Clone)]
pub struct GapEngine {
    calendar: Arc<dyn TradingCalendar>,
    aggregator: BarAggregator,
}

impl GapEngine {
    /// Creates a gap engine over `calendar`.
    #[must_use]
    pub fn new(calendar: Arc<dyn TradingCalendar>) -> Self {
        let aggregator = BarAggregator::with_calendar(Arc::clone(&calendar));
        Self {
            calendar,
            aggregator,
        }
    }

    /// Returns the calendar.
    #[must_use]
    pub const fn calendar(&self) -> &Arc<dyn TradingCalendar> {
        &self.calendar
    }

    /// Returns the calendar-aware aggregator used for gap fills.
    #[must_use]
    pub const fn aggregator(&self) -> &BarAggregator {
        &self.aggregator
    }

    /// Counts the bars of `interval` expected in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn expected_count(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, QualityError> {
        if end < start {
            return Ok(0);
        }
        if interval.is_intraday() {
            let step = step_seconds(interval);
            Ok(self
                .sessions(start, end)?
                .iter()
                .map(|bounds| grid_count(bounds, step, start, end))
                .sum())
        } else {
            let (from, to) = (self.date_of(start), self.date_of(end));
            let units = self.calendar_units(interval.unit(), from, to)?;
            Ok(units.div_ceil(u64::from(interval.multiplier())))
        }
    }

    /// Finds the gaps between consecutive bars.
    ///
    /// Overnight and weekend closures are not gaps: only slots the calendar
    /// expects between two bars are counted.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn detect_gaps(
        &self,
        bars: &[Bar],
        interval: Interval,
    ) -> Result<Vec<GapRecord>, QualityError> {
        let mut gaps = Vec::new();
        for pair in bars.windows(2) {
            if let Some(gap) = self.gap_between(interval, pair[0].timestamp, pair[1].timestamp)? {
                gaps.push(gap);
            }
        }
        Ok(gaps)
    }

    /// Finds gaps in `[start, end]`, including missing bars before the first
    /// and after the last bar in the window.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn detect_gaps_in_window(
        &self,
        bars: &[Bar],
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GapRecord>, QualityError> {
        let window: Vec<&Bar> = bars
            .iter()
            .filter(|bar| self.in_window(interval, bar.timestamp, start, end))
            .collect();
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            let missing = self.expected_count(interval, start, end)?;
            if missing == 0 {
                return Ok(Vec::new());
            }
            let (gap_start, gap_end) = self.window_bounds(interval, start, end)?;
            return Ok(vec![GapRecord::new(gap_start, gap_end, missing)]);
        };

        let mut gaps = Vec::new();
        if let Some(leading) = self.leading_gap(interval, start, first.timestamp)? {
            gaps.push(leading);
        }
        for pair in window.windows(2) {
            if let Some(gap) = self.gap_between(interval, pair[0].timestamp, pair[1].timestamp)? {
                gaps.push(gap);
            }
        }
        let trailing =
            self.trailing_gap(interval, start, end, last.timestamp, window.len(), &gaps)?;
        gaps.extend(trailing);
        Ok(gaps)
    }

    /// Assesses the completeness of `bars` over `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn assess(
        &self,
        bars: &[Bar],
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<QualityReport, QualityError> {
        let expected = self.expected_count(interval, start, end)?;
        let actual = bars
            .iter()
            .filter(|bar| self.in_window(interval, bar.timestamp, start, end))
            .count() as u64;
        let quality = if expected == 0 {
            100.0
        } else {
            (100.0 * actual as f64 / expected as f64).clamp(0.0, 100.0)
        };
        let gaps = self.detect_gaps_in_window(bars, interval, start, end)?;
        Ok(QualityReport {
            expected,
            actual,
            quality,
            gaps,
        })
    }

    /// Returns `100 * actual / expected` over `[start, end]`, clamped to `[0, 100]`.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn quality(
        &self,
        bars: &[Bar],
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64, QualityError> {
        Ok(self.assess(bars, interval, start, end)?.quality)
    }

    /// Passes only if `bars` are exactly 100% complete over `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::IncompleteSource`] with the window's quality
    /// and gaps if any expected bar is missing.
    pub fn require_complete(
        &self,
        bars: &[Bar],
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<QualityReport, QualityError> {
        let report = self.assess(bars, interval, start, end)?;
        if report.is_complete() {
            Ok(report)
        } else {
            Err(QualityError::IncompleteSource {
                quality: report.quality,
                gaps: report.gaps,
            })
        }
    }

    /// Fills `gap` in a `target` series from bars of the smaller `from` interval.
    ///
    /// The source must be 100% complete over the gap window and must produce
    /// every missing target bar. On success the returned bars are tagged with
    /// `filled_from` and the record is the resolved copy of `gap`.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::IncompleteSource`] if the source does not
    /// cover the gap, in which case the gap stays open.
    pub fn fill_gap(
        &self,
        gap: &GapRecord,
        target: Interval,
        from: Interval,
        from_bars: &[Bar],
    ) -> Result<GapFill, QualityError> {
        let window: Vec<Bar> = from_bars
            .iter()
            .filter(|bar| bar.timestamp >= gap.start() && bar.timestamp < gap.end())
            .cloned()
            .collect();
        self.require_complete(&window, from, gap.start(), gap.end() - TimeDelta::seconds(1))?;

        let symbol = window.first().map(|bar| bar.symbol.clone()).unwrap_or_default();
        let request = AggregationRequest::new(symbol.as_str(), from, target);
        let bars: Vec<Bar> = self
            .aggregator
            .aggregate(&window, &request)?
            .into_iter()
            .map(|bar| bar.with_filled_from(from))
            .collect();
        if (bars.len() as u64) < gap.missing() {
            return Err(QualityError::IncompleteSource {
                quality: 100.0 * bars.len() as f64 / gap.missing() as f64,
                gaps: vec![*gap],
            });
        }

        debug!(
            symbol = %symbol,
            %target,
            %from,
            filled = bars.len(),
            start = %gap.start(),
            "Filled gap"
        );
        Ok(GapFill {
            record: gap.resolved(from),
            bars,
        })
    }

    fn date_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        self.calendar.trading_date(ts)
    }

    fn in_window(
        &self,
        interval: Interval,
        ts: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        if interval.is_intraday() {
            ts >= start && ts <= end
        } else {
            let date = self.date_of(ts);
            date >= self.date_of(start) && date <= self.date_of(end)
        }
    }

    fn sessions(
        &self,
        lo: DateTime<Utc>,
        hi: DateTime<Utc>,
    ) -> Result<Vec<SessionBounds>, QualityError> {
        let Ok(range) = DateRange::new(self.date_of(lo), self.date_of(hi)) else {
            return Ok(Vec::new());
        };
        let mut sessions = Vec::new();
        for date in range.days() {
            if let Some(bounds) = self.calendar.session_bounds(date)? {
                sessions.push(bounds);
            }
        }
        Ok(sessions)
    }

    /// Trading days (or weeks with a trading day) in `[from, to]`.
    fn calendar_units(
        &self,
        unit: IntervalUnit,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64, QualityError> {
        let Ok(range) = DateRange::new(from, to) else {
            return Ok(0);
        };
        let days = self.calendar.trading_days(range)?;
        Ok(match unit {
            IntervalUnit::Week => {
                let weeks: BTreeSet<NaiveDate> = days.iter().map(|day| week_start(*day)).collect();
                weeks.len() as u64
            }
            _ => days.len() as u64,
        })
    }

    fn day_start(&self, date: NaiveDate) -> Result<DateTime<Utc>, QualityError> {
        Ok(self
            .calendar
            .session_bounds(date)?
            .map_or_else(|| date.and_time(NaiveTime::MIN).and_utc(), |bounds| bounds.open))
    }

    fn first_slot(
        &self,
        interval: Interval,
        lo: DateTime<Utc>,
        hi: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, QualityError> {
        let step = step_seconds(interval);
        for bounds in self.sessions(lo, hi)? {
            if let Some(slot) = grid_first_at_or_after(&bounds, step, lo) {
                return Ok((slot <= hi).then_some(slot));
            }
        }
        Ok(None)
    }

    fn last_slot(
        &self,
        interval: Interval,
        lo: DateTime<Utc>,
        hi: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, QualityError> {
        let step = step_seconds(interval);
        for bounds in self.sessions(lo, hi)?.iter().rev() {
            if let Some(slot) = grid_last_at_or_before(bounds, step, hi) {
                return Ok((slot >= lo).then_some(slot));
            }
        }
        Ok(None)
    }

    /// Start of the first calendar period after the one containing `date`.
    fn next_period_start(
        &self,
        interval: Interval,
        date: NaiveDate,
    ) -> Result<DateTime<Utc>, QualityError> {
        let first = match interval.unit() {
            IntervalUnit::Week => {
                let days = 7 * u64::from(interval.multiplier()) - 1;
                let boundary = week_start(date).checked_add_days(Days::new(days)).unwrap_or(date);
                self.calendar.next_trading_day(boundary)?
            }
            _ => {
                let mut day = date;
                for _ in 0..interval.multiplier() {
                    day = self.calendar.next_trading_day(day)?;
                }
                day
            }
        };
        self.day_start(first)
    }

    /// Returns the gap between two consecutive bar timestamps, if the
    /// calendar expects bars strictly between them.
    ///
    /// # Errors
    ///
    /// Returns an error if a calendar lookup fails.
    pub fn gap_between(
        &self,
        interval: Interval,
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<Option<GapRecord>, QualityError> {
        if next <= prev {
            return Ok(None);
        }

        if interval.is_intraday() {
            let lo = prev + TimeDelta::seconds(1);
            let hi = next - TimeDelta::seconds(1);
            let missing = self.expected_count(interval, lo, hi)?;
            if missing == 0 {
                return Ok(None);
            }
            let start = self
                .first_slot(interval, lo, hi)?
                .unwrap_or(prev + interval.duration());
            return Ok(Some(GapRecord::new(start, next, missing)));
        }

        let (prev_date, next_date) = (self.date_of(prev), self.date_of(next));
        let multiplier = u64::from(interval.multiplier());
        let missing = match interval.unit() {
            IntervalUnit::Week => {
                let from = week_start(prev_date)
                    .checked_add_days(Days::new(7))
                    .unwrap_or(prev_date);
                let to = week_start(next_date).pred_opt().unwrap_or(next_date);
                // The previous bar's period spans `multiplier` weeks.
                self.calendar_units(IntervalUnit::Week, from, to)?
                    .saturating_sub(multiplier - 1)
                    / multiplier
            }
            _ => {
                let between = match (prev_date.succ_opt(), next_date.pred_opt()) {
                    (Some(from), Some(to)) => self.calendar_units(IntervalUnit::Day, from, to)?,
                    _ => 0,
                };
                between.saturating_sub(multiplier - 1) / multiplier
            }
        };
        if missing == 0 {
            return Ok(None);
        }
        let start = self.next_period_start(interval, prev_date)?;
        Ok(Some(GapRecord::new(start, next, missing)))
    }

    fn leading_gap(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        first: DateTime<Utc>,
    ) -> Result<Option<GapRecord>, QualityError> {
        if interval.is_intraday() {
            let hi = first - TimeDelta::seconds(1);
            let missing = self.expected_count(interval, start, hi)?;
            if missing == 0 {
                return Ok(None);
            }
            let gap_start = self.first_slot(interval, start, hi)?.unwrap_or(start);
            return Ok(Some(GapRecord::new(gap_start, first, missing)));
        }

        let Some(before_first) = self.date_of(first).pred_opt() else {
            return Ok(None);
        };
        let units = self.calendar_units(interval.unit(), self.date_of(start), before_first)?;
        let missing = units.div_ceil(u64::from(interval.multiplier()));
        if missing == 0 {
            return Ok(None);
        }
        let (gap_start, _) = self.window_bounds(interval, start, first)?;
        Ok(Some(GapRecord::new(gap_start, first, missing)))
    }

    fn trailing_gap(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        last: DateTime<Utc>,
        present: usize,
        found: &[GapRecord],
    ) -> Result<Option<GapRecord>, QualityError> {
        if interval.is_intraday() {
            let lo = last + TimeDelta::seconds(1);
            let missing = self.expected_count(interval, lo, end)?;
            if missing == 0 {
                return Ok(None);
            }
            let gap_start = self.first_slot(interval, lo, end)?.unwrap_or(lo);
            let gap_end = self
                .last_slot(interval, lo, end)?
                .map_or(end, |slot| slot + interval.duration());
            return Ok(Some(GapRecord::new(gap_start, gap_end, missing)));
        }

        // Calendar periods do not sit on a fixed grid: whatever the expected
        // count leaves unexplained is missing after the last bar.
        let accounted = present as u64 + found.iter().map(GapRecord::missing).sum::<u64>();
        let missing = self
            .expected_count(interval, start, end)?
            .saturating_sub(accounted);
        if missing == 0 {
            return Ok(None);
        }
        let gap_start = self.next_period_start(interval, self.date_of(last))?;
        let (_, gap_end) = self.window_bounds(interval, start, end)?;
        Ok(Some(GapRecord::new(gap_start, gap_end, missing)))
    }

    /// First expected slot in the window and the instant just after it.
    fn window_bounds(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), QualityError> {
        if interval.is_intraday() {
            let first = self.first_slot(interval, start, end)?.unwrap_or(start);
            let last = self
                .last_slot(interval, start, end)?
                .map_or(end, |slot| slot + interval.duration());
            return Ok((first, last));
        }
        let start_date = self.date_of(start);
        let first_day = if self.calendar.is_trading_day(start_date)? {
            start_date
        } else {
            self.calendar.next_trading_day(start_date)?
        };
        let after = self.calendar.next_trading_day(self.date_of(end))?;
        Ok((self.day_start(first_day)?, self.day_start(after)?))
    }
}

fn step_seconds(interval: Interval) -> i64 {
    interval.canonical_seconds() as i64
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
        .unwrap_or(date)
}

/// Highest slot index of the session grid, if any slot fits.
fn last_index(bounds: &SessionBounds, step: i64) -> Option<i64> {
    let span = bounds.duration().num_seconds();
    (span >= step).then(|| (span - step).div_euclid(step))
}

fn ceil_index(offset: i64, step: i64) -> i64 {
    (offset.max(0) + step - 1).div_euclid(step)
}

fn grid_count(bounds: &SessionBounds, step: i64, lo: DateTime<Utc>, hi: DateTime<Utc>) -> u64 {
    let Some(max_index) = last_index(bounds, step) else {
        return 0;
    };
    let hi_offset = (hi - bounds.open).num_seconds();
    if hi_offset < 0 {
        return 0;
    }
    let first = ceil_index((lo - bounds.open).num_seconds(), step);
    let last = max_index.min(hi_offset.div_euclid(step));
    if last < first {
        0
    } else {
        (last - first + 1) as u64
    }
}

fn grid_first_at_or_after(
    bounds: &SessionBounds,
    step: i64,
    ts: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let max_index = last_index(bounds, step)?;
    let index = ceil_index((ts - bounds.open).num_seconds(), step);
    (index <= max_index).then(|| bounds.open + TimeDelta::seconds(index * step))
}

fn grid_last_at_or_before(
    bounds: &SessionBounds,
    step: i64,
    ts: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let max_index = last_index(bounds, step)?;
    let offset = (ts - bounds.open).num_seconds();
    if offset < 0 {
        return None;
    }
    let index = max_index.min(offset.div_euclid(step));
    Some(bounds.open + TimeDelta::seconds(index * step))
}
