//! Storage collaborator for cadence.
//!
//! Persistent bar storage sits behind the [`BarStore`] trait. This crate ships
//! a thread-safe [`InMemoryBarStore`] that can be filled from JSON bar files,
//! and the [`AvailabilityProbe`] that answers "which intervals are stored for
//! this symbol and date range?".

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod json;
mod probe;
mod store;

pub use json::{JsonStyle, read_bars, write_bars};
pub use probe::{AvailabilityProbe, AvailabilityReport};
pub use store::{Availability, BarStore, InMemoryBarStore, StorageError};
