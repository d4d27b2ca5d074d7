//! Error types for stream determination and historical loading.

use cadence_aggregate::AggregateError;
use cadence_calendar::CalendarError;
use cadence_quality::QualityError;
use cadence_storage::StorageError;
use cadence_types::{CadenceError, Interval};
use thiserror::Error;

/// Errors raised while planning or loading a symbol's data.
#[derive(Error, Debug)]
pub enum DetermineError {
    /// Storage holds no base interval for the symbol and date range.
    #[error("No storage-backed base interval available for {symbol}")]
    NoBaseIntervalAvailable {
        /// The symbol being registered.
        symbol: String,
    },

    /// Every candidate source for the interval was missing or incomplete.
    #[error("No viable source for {symbol} {interval} (tried {tried})")]
    NoViableSource {
        /// The symbol being loaded.
        symbol: String,
        /// The interval that could not be produced.
        interval: Interval,
        /// Number of candidate paths attempted.
        tried: usize,
    },

    /// Storage read failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Calendar lookup failed.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Aggregation request was rejected.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Gap engine failure other than an incomplete source.
    #[error(transparent)]
    Quality(#[from] QualityError),
}

impl From<DetermineError> for CadenceError {
    fn from(err: DetermineError) -> Self {
        match err {
            DetermineError::NoBaseIntervalAvailable { symbol } => {
                Self::NoBaseIntervalAvailable { symbol }
            }
            DetermineError::NoViableSource { symbol, interval, .. } => {
                Self::NoViableSource { symbol, interval }
            }
            DetermineError::Storage(err) => err.into(),
            DetermineError::Calendar(err) => err.into(),
            DetermineError::Aggregate(err) => err.into(),
            DetermineError::Quality(err) => err.into(),
        }
    }
}
