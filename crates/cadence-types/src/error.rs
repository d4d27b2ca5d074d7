//! Error types for cadence.

use chrono::NaiveDate;
use thiserror::Error;

use crate::{Interval, IntervalParseError};

/// Result type alias for cadence session operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Session-level error taxonomy.
///
/// Each component crate has its own error enum; they all convert into this
/// one so the coordinator can report a failure per symbol with a reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CadenceError {
    /// Invalid requirement such as a duplicate symbol. Rejects that symbol only.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid interval string.
    #[error(transparent)]
    Interval(#[from] IntervalParseError),

    /// Invalid date range.
    #[error(transparent)]
    DateRange(#[from] DateRangeError),

    /// Every source for an interval was missing or incomplete.
    #[error("No viable source for {symbol} {interval}")]
    NoViableSource {
        /// The symbol being loaded.
        symbol: String,
        /// The interval that could not be produced.
        interval: Interval,
    },

    /// Storage holds no base interval for the symbol.
    #[error("No storage-backed base interval available for {symbol}")]
    NoBaseIntervalAvailable {
        /// The symbol being registered.
        symbol: String,
    },

    /// The completeness gate rejected a source window.
    #[error("Incomplete source data: quality {quality:.2}%")]
    IncompleteSource {
        /// Quality of the source window, in percent.
        quality: f64,
    },

    /// A consumer did not signal readiness in time.
    #[error("Consumer '{consumer}' did not signal ready in time")]
    BackpressureTimeout {
        /// Name of the slow consumer.
        consumer: String,
    },

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The calendar collaborator failed.
    #[error("Calendar error: {0}")]
    Calendar(String),
}

/// Error for invalid date ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// Start date is after end date.
    #[error("Invalid date range: {start} > {end}")]
    InvalidRange {
        /// The start date.
        start: NaiveDate,
        /// The end date.
        end: NaiveDate,
    },
}
