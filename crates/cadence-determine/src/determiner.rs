//! Base-interval selection and fallback planning.

use cadence_aggregate::AggregationRequest;
use cadence_storage::AvailabilityReport;
use cadence_types::{Interval, IntervalUnit};
use tracing::{debug, warn};

use crate::{DetermineError, HistoricalPlan, QuoteSource, SessionMode, SourcePath, StreamPlan};

/// Decides which interval is read from storage and which are derived.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamDeterminer;

impl StreamDeterminer {
    /// Creates a determiner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns true if `target` can be aggregated from `source` bars.
    #[must_use]
    pub fn can_derive(source: Interval, target: Interval) -> bool {
        AggregationRequest::new("", source, target).validate().is_ok()
    }

    /// Storage intervals tried, in order, when `target` is not stored.
    #[must_use]
    pub const fn fallback_chain(target: Interval) -> &'static [Interval] {
        match target.unit() {
            IntervalUnit::Second => &[Interval::ONE_SECOND],
            IntervalUnit::Minute => &[Interval::ONE_MINUTE, Interval::ONE_SECOND],
            IntervalUnit::Day | IntervalUnit::Week => {
                &[Interval::ONE_DAY, Interval::ONE_MINUTE, Interval::ONE_SECOND]
            }
        }
    }

    /// Plans the current-day stream for a symbol.
    ///
    /// Streams the smallest stored base interval and derives every other
    /// requested interval from it. Intervals that cannot be derived from the
    /// base are listed in [`StreamPlan::unavailable`] and the rest of the plan
    /// stands.
    ///
    /// # Errors
    ///
    /// Returns [`DetermineError::NoBaseIntervalAvailable`] if storage holds
    /// no base interval for the symbol.
    pub fn plan_stream(
        &self,
        requested: &[Interval],
        report: &AvailabilityReport,
        mode: SessionMode,
        quotes_wanted: bool,
    ) -> Result<StreamPlan, DetermineError> {
        let Some(base) = report.smallest_base() else {
            return Err(DetermineError::NoBaseIntervalAvailable {
                symbol: report.symbol.clone(),
            });
        };

        let mut wanted = requested.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut derived = Vec::new();
        let mut unavailable = Vec::new();
        for interval in wanted.into_iter().filter(|interval| *interval != base) {
            if Self::can_derive(base, interval) {
                derived.push(interval);
            } else {
                warn!(
                    symbol = %report.symbol,
                    %base,
                    %interval,
                    "Interval cannot be derived from base"
                );
                unavailable.push(interval);
            }
        }

        let quotes = match (quotes_wanted, mode) {
            (false, _) => QuoteSource::None,
            (true, SessionMode::Live) => QuoteSource::Streamed,
            (true, SessionMode::Backtest) => QuoteSource::Synthesized,
        };

        debug!(symbol = %report.symbol, %base, derived = derived.len(), ?quotes, "Planned stream");
        Ok(StreamPlan {
            symbol: report.symbol.clone(),
            base,
            derived,
            quotes,
            unavailable,
        })
    }

    /// Lists the candidate source paths for a historical `target` load.
    ///
    /// A stored target is loaded directly; otherwise each stored interval of
    /// the fallback chain that can produce the target yields a staged path.
    #[must_use]
    pub fn plan_historical(&self, target: Interval, report: &AvailabilityReport) -> HistoricalPlan {
        let mut candidates = Vec::new();
        if report.is_stored(target) {
            candidates.push(SourcePath::direct(target));
        }
        for source in Self::fallback_chain(target) {
            if *source == target || !report.is_stored(*source) {
                continue;
            }
            if Self::can_derive(*source, target) {
                candidates.push(SourcePath::between(*source, target));
            }
        }
        HistoricalPlan {
            symbol: report.symbol.clone(),
            target,
            candidates,
        }
    }
}
