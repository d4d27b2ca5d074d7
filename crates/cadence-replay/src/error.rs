//! Replay errors.

use cadence_aggregate::AggregateError;
use cadence_calendar::CalendarError;
use cadence_determine::DetermineError;
use cadence_quality::QualityError;
use cadence_session::SessionError;
use cadence_storage::StorageError;
use cadence_types::{CadenceError, DateRangeError};
use thiserror::Error;

use crate::ConfigError;

/// Errors raised by the replay coordinator.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The session configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Consumers did not exit within the shutdown timeout.
    #[error("Consumer shutdown timed out: {consumer}")]
    ShutdownTimeout {
        /// Names of the consumers still running.
        consumer: String,
    },

    /// A consumer thread could not be started.
    #[error("Failed to spawn consumer thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Session store rejection.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Invalid date range.
    #[error(transparent)]
    DateRange(#[from] DateRangeError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Calendar failure.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Aggregation failure.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Gap or quality computation failure.
    #[error(transparent)]
    Quality(#[from] QualityError),

    /// Stream planning or historical load failure.
    #[error(transparent)]
    Determine(#[from] DetermineError),
}

impl From<ReplayError> for CadenceError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Config(err) => err.into(),
            ReplayError::ShutdownTimeout { consumer } => Self::BackpressureTimeout { consumer },
            ReplayError::Spawn(err) => Self::Configuration(err.to_string()),
            ReplayError::Session(err) => err.into(),
            ReplayError::DateRange(err) => err.into(),
            ReplayError::Storage(err) => err.into(),
            ReplayError::Calendar(err) => err.into(),
            ReplayError::Aggregate(err) => err.into(),
            ReplayError::Quality(err) => err.into(),
            ReplayError::Determine(err) => err.into(),
        }
    }
}
