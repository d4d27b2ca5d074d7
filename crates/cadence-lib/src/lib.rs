//! Market-data session engine: interval derivation, gap-aware aggregation
//! and chronological multi-symbol replay.
//!
//! This is a facade crate that re-exports functionality from the cadence
//! workspace crates for convenient access.
//!
//! # Quick Start
//!
//! ```ignore
//! use cadence_lib::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bars = Arc::new(InMemoryBarStore::new());
//!     bars.load_json_file("data/AAPL_1m.ndjson".as_ref(), Interval::ONE_MINUTE)?;
//!
//!     let config = SessionConfig::from_file("session.json".as_ref())?;
//!     let mut coordinator = ReplayCoordinator::new(config, bars);
//!     let stats = coordinator.run()?;
//!     println!("Replayed {} bars", stats.drained_bars);
//!
//!     let snapshot = coordinator.store().export(ExportMode::Complete);
//!     println!("{} symbols", snapshot.symbols.len());
//!     Ok(())
//! }
//! ```

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use cadence_types::*;

// Re-export the calendar and clock collaborators
pub use cadence_calendar::{
    AlwaysOpenCalendar, CalendarError, Clock, ExchangeCalendar, ManualClock, SessionBounds,
    TradingCalendar, WallClock,
};

// Re-export storage
pub use cadence_storage::{
    Availability, AvailabilityProbe, AvailabilityReport, BarStore, InMemoryBarStore, JsonStyle,
    StorageError, read_bars, write_bars,
};

// Re-export aggregation
pub use cadence_aggregate::{
    AggregateError, AggregationRequest, BarAggregator, GroupingMode, OhlcvItem, StreamEvent,
    StreamingAggregator,
};

// Re-export gap detection
pub use cadence_quality::{GapEngine, GapFill, GapRecord, QualityError, QualityReport};

// Re-export session state and planning
#[cfg(feature = "determine")]
pub use cadence_session::{
    ExportMode, GapSummary, IntervalSeries, Registration, SeriesSnapshot, SessionError,
    SessionSnapshot, SessionStore, SymbolSession, SymbolSnapshot,
};

#[cfg(feature = "determine")]
pub use cadence_determine::{
    DetermineError, HistoricalLoad, HistoricalLoader, HistoricalPlan, QuoteSource, SessionMode,
    SourcePath, StreamDeterminer, StreamPlan,
};

// Re-export replay
#[cfg(feature = "replay")]
pub use cadence_replay::{
    ConfigError, Consumer, ConsumerConfig, CoordinatorHandle, CoordinatorStats, DataType,
    Interest, LagConfig, LiveEvent, LiveFeed, Notification, RegistrationReport, ReplayCoordinator,
    ReplayError, SessionConfig, SessionPhase, StepOutcome, SymbolConfig,
};

/// Prelude module for convenient imports.
///
/// ```
/// use cadence_lib::prelude::*;
/// ```
pub mod prelude {
    pub use cadence_types::{
        Bar, CadenceError, DateRange, DateRangeError, Interval, IntervalUnit, Quote, Result, Tick,
    };

    pub use cadence_calendar::{Clock, ExchangeCalendar, TradingCalendar, WallClock};

    pub use cadence_storage::{BarStore, InMemoryBarStore};

    pub use cadence_aggregate::{AggregationRequest, BarAggregator, StreamingAggregator};

    pub use cadence_quality::{GapEngine, GapRecord};

    #[cfg(feature = "determine")]
    pub use cadence_session::{ExportMode, SessionSnapshot, SessionStore};

    #[cfg(feature = "determine")]
    pub use cadence_determine::{HistoricalLoader, SessionMode, StreamDeterminer};

    #[cfg(feature = "replay")]
    pub use cadence_replay::{
        Consumer, CoordinatorHandle, Interest, Notification, ReplayCoordinator, SessionConfig,
        SymbolConfig,
    };
}
