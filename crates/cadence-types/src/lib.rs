//! Core types for the cadence market-data session engine.
//!
//! This crate provides the fundamental data structures used throughout cadence:
//!
//! - [`Interval`] - Bar resolution with canonical form and total ordering
//! - [`Bar`] - A single OHLCV bar for one symbol and period
//! - [`Tick`] - A trade print, the input to sub-bar aggregation
//! - [`Quote`] - Top-of-book quote, streamed live or synthesized in backtests
//! - [`DateRange`] - Inclusive date range for data retrieval
//! - [`CadenceError`] - Session-level error taxonomy

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bar;
mod date_range;
mod error;
mod interval;
mod tick;

pub use bar::{Bar, BarError};
pub use date_range::{DateRange, DayIterator};
pub use error::{CadenceError, DateRangeError, Result};
pub use interval::{Interval, IntervalParseError, IntervalUnit};
pub use tick::{Quote, Tick};
