//! Coordinator counters and reports.

use std::collections::BTreeMap;
use std::fmt;

use cadence_types::Interval;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of the current trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Previous session state is being dropped.
    #[default]
    Teardown,
    /// Symbols are being registered and queues built.
    Initialize,
    /// The store is being opened to readers.
    Activate,
    /// Bars are being replayed.
    Streaming,
    /// The day is being closed out.
    Deactivate,
    /// Every trading day has been replayed and consumers have stopped.
    Finished,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Teardown => "teardown",
            Self::Initialize => "initialize",
            Self::Activate => "activate",
            Self::Streaming => "streaming",
            Self::Deactivate => "deactivate",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Running counters of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Bars moved from the queues into the session.
    pub drained_bars: u64,
    /// Bars dropped for falling outside regular hours.
    pub out_of_hours_drops: u64,
    /// Times the lag protocol reopened the store.
    pub activations: u64,
    /// Times the lag protocol closed the store.
    pub deactivations: u64,
    /// Times a consumer queue was full.
    pub backpressure_events: u64,
    /// Missed ready deadlines per consumer.
    pub overruns: BTreeMap<String, u64>,
    /// Notifications posted.
    pub notifications: u64,
    /// Trading days started.
    pub trading_days: u64,
    /// Session gaps filled from smaller stored intervals at the close.
    pub filled_gaps: u64,
}

/// Outcome of registering the requested symbols for a trading day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    /// Symbols registered.
    pub accepted: Vec<String>,
    /// Symbols rejected, with the reason.
    pub rejected: Vec<(String, String)>,
    /// Requested intervals that cannot be derived from the symbol's base.
    pub unavailable: Vec<(String, Interval)>,
    /// Intervals for which no history could be loaded.
    pub history_missing: Vec<(String, Interval)>,
}

impl RegistrationReport {
    /// Returns true if every requested symbol was registered.
    #[must_use]
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}
