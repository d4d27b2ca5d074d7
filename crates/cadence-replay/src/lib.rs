//! Chronological multi-symbol replay for the cadence session engine.
//!
//! - [`ReplayCoordinator`] - Per-day lifecycle and the merge-drain streaming loop
//! - [`CoordinatorHandle`] - Pause, resume, stop and mid-session symbol changes
//! - [`ReplayQueues`] - Per-symbol, per-interval FIFO queues
//! - [`LagMonitor`] - Lag-based store activation
//! - [`ConsumerPool`] - Consumer threads with a synchronous ready hand-off
//! - [`SessionConfig`] - JSON session configuration

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod consumer;
mod coordinator;
mod error;
mod lag;
mod queue;
mod stats;

pub use config::{ConfigError, ConsumerConfig, LagConfig, SessionConfig, SymbolConfig};
pub use consumer::{Consumer, ConsumerPool, DataType, Interest, Notification};
pub use coordinator::{CoordinatorHandle, LiveEvent, LiveFeed, ReplayCoordinator, StepOutcome};
pub use error::ReplayError;
pub use lag::LagMonitor;
pub use queue::{Drained, ReplayQueues};
pub use stats::{CoordinatorStats, RegistrationReport, SessionPhase};
