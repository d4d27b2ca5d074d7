//! Aggregation requests and grouping modes.

use cadence_calendar::CalendarError;
use cadence_types::{CadenceError, Interval};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How source items are grouped into target bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Truncate timestamps to the epoch-aligned target boundary. Used for
    /// ticks; any number of items per bucket.
    TimeWindow,
    /// Exactly `target / source` consecutive source bars per target bar.
    FixedChunk,
    /// Trading-day or week buckets counted from the first item.
    Calendar,
}

impl GroupingMode {
    /// Picks the mode for aggregating `source` bars into `target` bars.
    #[must_use]
    pub const fn select(source: Interval, target: Interval) -> Self {
        if target.is_calendar() || source.is_calendar() {
            Self::Calendar
        } else {
            Self::FixedChunk
        }
    }
}

impl std::fmt::Display for GroupingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TimeWindow => "time_window",
            Self::FixedChunk => "fixed_chunk",
            Self::Calendar => "calendar",
        };
        write!(f, "{name}")
    }
}

/// One aggregation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRequest {
    /// Symbol stamped on the output bars.
    pub symbol: String,
    /// Source interval, or `None` for raw ticks.
    pub source: Option<Interval>,
    /// Target interval.
    pub target: Interval,
    /// Grouping mode.
    pub mode: GroupingMode,
    /// Drop target bars built from fewer than the expected source bars.
    pub require_complete: bool,
    /// Drop target bars whose source bars are not one period apart.
    pub check_continuity: bool,
}

impl AggregationRequest {
    /// Builds a bar-to-bar request with the mode picked by
    /// [`GroupingMode::select`].
    ///
    /// Fixed chunks default to requiring complete, continuous input;
    /// calendar buckets are relaxed.
    #[must_use]
    pub fn new(symbol: impl Into<String>, source: Interval, target: Interval) -> Self {
        let mode = GroupingMode::select(source, target);
        let strict = mode == GroupingMode::FixedChunk;
        Self {
            symbol: symbol.into(),
            source: Some(source),
            target,
            mode,
            require_complete: strict,
            check_continuity: strict,
        }
    }

    /// Builds a tick-to-bar request.
    #[must_use]
    pub fn from_ticks(symbol: impl Into<String>, target: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            source: None,
            target,
            mode: GroupingMode::TimeWindow,
            require_complete: false,
            check_continuity: false,
        }
    }

    /// Overrides the grouping mode.
    #[must_use]
    pub fn with_mode(mut self, mode: GroupingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether incomplete target bars are dropped.
    #[must_use]
    pub fn with_require_complete(mut self, require_complete: bool) -> Self {
        self.require_complete = require_complete;
        self
    }

    /// Sets whether discontinuous target bars are dropped.
    #[must_use]
    pub fn with_check_continuity(mut self, check_continuity: bool) -> Self {
        self.check_continuity = check_continuity;
        self
    }

    /// Returns the number of source bars per target bar in fixed-chunk mode.
    #[must_use]
    pub fn chunk_size(&self) -> Option<u64> {
        self.source.and_then(|source| self.target.ratio_to(&source))
    }

    /// Checks that the target can be built from the source in this mode.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Incompatible`] if the target is smaller than
    /// the source, or the mode cannot produce the target.
    pub fn validate(&self) -> Result<(), AggregateError> {
        let incompatible = |reason: &str| AggregateError::Incompatible {
            source_interval: self.source,
            target: self.target,
            reason: reason.to_string(),
        };

        if self.source.is_some_and(|source| self.target < source) {
            return Err(incompatible("target is smaller than source"));
        }

        match self.mode {
            GroupingMode::TimeWindow => {
                if !self.target.is_intraday() {
                    return Err(incompatible("time windows need an intraday target"));
                }
            }
            GroupingMode::FixedChunk => {
                let Some(source) = self.source else {
                    return Err(incompatible("fixed chunks need a bar source"));
                };
                if !self.target.is_intraday() || !source.is_intraday() {
                    return Err(incompatible("fixed chunks need intraday intervals"));
                }
                if !self.target.is_multiple_of(&source) {
                    return Err(incompatible("target is not a multiple of source"));
                }
            }
            GroupingMode::Calendar => {
                if !self.target.is_calendar() {
                    return Err(incompatible("calendar buckets need a day or week target"));
                }
            }
        }
        Ok(())
    }
}

/// Errors that can occur during aggregation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The target interval cannot be built from the source.
    #[error("Cannot aggregate {} to {target}: {reason}", source_label(.source_interval))]
    Incompatible {
        /// Source interval, `None` for ticks.
        source_interval: Option<Interval>,
        /// Requested target.
        target: Interval,
        /// Why the pair is incompatible.
        reason: String,
    },

    /// The calendar could not resolve a trading date or session.
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

fn source_label(source: &Option<Interval>) -> String {
    source.map_or_else(|| "ticks".to_string(), |interval| interval.to_string())
}

impl From<AggregateError> for CadenceError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::Calendar(err) => err.into(),
            other => Self::Configuration(other.to_string()),
        }
    }
}
