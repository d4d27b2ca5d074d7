//! Per-interval bar series.

use cadence_quality::GapRecord;
use cadence_types::{Bar, Interval};
use tracing::warn;

/// Bars of one interval together with their quality metadata.
///
/// A series is either the symbol's base series or derived from a smaller
/// source interval. Bars are kept in strictly ascending timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSeries {
    interval: Interval,
    source_interval: Option<Interval>,
    bars: Vec<Bar>,
    quality: f64,
    gaps: Vec<GapRecord>,
    dirty: bool,
    last_exported: usize,
}

impl IntervalSeries {
    /// Creates an empty base series.
    #[must_use]
    pub const fn base(interval: Interval) -> Self {
        Self::with_source(interval, None)
    }

    /// Creates an empty series derived from `source`.
    #[must_use]
    pub const fn derived(interval: Interval, source: Interval) -> Self {
        Self::with_source(interval, Some(source))
    }

    const fn with_source(interval: Interval, source_interval: Option<Interval>) -> Self {
        Self {
            interval,
            source_interval,
            bars: Vec::new(),
            quality: 100.0,
            gaps: Vec::new(),
            dirty: false,
            last_exported: 0,
        }
    }

    /// Builds a series from already loaded bars, sorting them by timestamp.
    #[must_use]
    pub fn from_bars(
        interval: Interval,
        source_interval: Option<Interval>,
        mut bars: Vec<Bar>,
    ) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by_key(|bar| bar.timestamp);
        let dirty = !bars.is_empty();
        Self {
            bars,
            dirty,
            ..Self::with_source(interval, source_interval)
        }
    }

    /// Returns the interval.
    #[must_use]
    pub const fn interval(&self) -> Interval {
        self.interval
    }

    /// Returns true if the series is synthesized from a smaller interval.
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        self.source_interval.is_some()
    }

    /// Returns the interval the series is derived from.
    #[must_use]
    pub const fn source_interval(&self) -> Option<Interval> {
        self.source_interval
    }

    /// Returns the bars in ascending timestamp order.
    #[must_use]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Returns the most recent bar.
    #[must_use]
    pub fn latest(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Returns the number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if the series holds no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Returns the quality percentage.
    #[must_use]
    pub const fn quality(&self) -> f64 {
        self.quality
    }

    /// Returns every gap record, open or filled.
    #[must_use]
    pub fn gaps(&self) -> &[GapRecord] {
        &self.gaps
    }

    /// Returns the gaps that have not been filled.
    pub fn open_gaps(&self) -> impl Iterator<Item = &GapRecord> {
        self.gaps.iter().filter(|gap| gap.is_open())
    }

    /// Returns true if bars were added since the last delta export.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the bar index up to which the series has been delta exported.
    #[must_use]
    pub const fn last_exported(&self) -> usize {
        self.last_exported
    }

    /// Appends a bar.
    ///
    /// Returns false, leaving the series untouched, if the bar does not come
    /// after the latest one.
    pub fn push(&mut self, bar: Bar) -> bool {
        if self.bars.last().is_some_and(|latest| bar.timestamp <= latest.timestamp) {
            warn!(
                symbol = %bar.symbol,
                interval = %self.interval,
                timestamp = %bar.timestamp,
                "Ignoring bar that does not advance the series"
            );
            return false;
        }
        self.bars.push(bar);
        self.dirty = true;
        true
    }

    /// Inserts fill bars at their timestamps, skipping ones already present.
    ///
    /// Returns the number of bars inserted.
    pub fn insert_filled(&mut self, bars: impl IntoIterator<Item = Bar>) -> usize {
        let mut inserted = 0;
        for bar in bars {
            if let Err(index) = self
                .bars
                .binary_search_by_key(&bar.timestamp, |held| held.timestamp)
            {
                self.bars.insert(index, bar);
                // The next delta re-exports from the earliest insertion point.
                self.last_exported = self.last_exported.min(index);
                self.dirty = true;
                inserted += 1;
            }
        }
        inserted
    }

    /// Sets the quality percentage, clamped to `[0, 100]`.
    pub fn set_quality(&mut self, quality: f64) {
        self.quality = quality.clamp(0.0, 100.0);
    }

    /// Records a gap.
    pub fn record_gap(&mut self, gap: GapRecord) {
        self.gaps.push(gap);
    }

    /// Replaces all gap records.
    pub fn set_gaps(&mut self, gaps: Vec<GapRecord>) {
        self.gaps = gaps;
    }

    /// Replaces the open gap starting at `resolved.start()` with its filled
    /// record.
    ///
    /// Returns false if no such open gap exists.
    pub fn resolve_gap(&mut self, resolved: GapRecord) -> bool {
        match self
            .gaps
            .iter_mut()
            .find(|gap| gap.is_open() && gap.start() == resolved.start())
        {
            Some(gap) => {
                *gap = resolved;
                true
            }
            None => false,
        }
    }

    /// Returns the bars added since the last delta export and advances the
    /// export index.
    pub fn take_delta(&mut self) -> &[Bar] {
        let from = self.last_exported.min(self.bars.len());
        self.last_exported = self.bars.len();
        self.dirty = false;
        &self.bars[from..]
    }
}
