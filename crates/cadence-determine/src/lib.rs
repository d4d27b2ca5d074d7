//! Stream determination and historical loading for the cadence session engine.
//!
//! For each symbol this crate decides which single interval is read from
//! storage and which are synthesized:
//!
//! - [`StreamDeterminer`] - Smallest-base selection for the current day and
//!   fallback planning for history
//! - [`HistoricalLoader`] - Direct loads with gap filling, otherwise the
//!   fallback chain under the completeness gate
//! - [`StreamPlan`] / [`HistoricalPlan`] / [`SourcePath`] - The decisions

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod determiner;
mod error;
mod loader;
mod plan;

pub use determiner::StreamDeterminer;
pub use error::DetermineError;
pub use loader::{HistoricalLoad, HistoricalLoader};
pub use plan::{HistoricalPlan, QuoteSource, SessionMode, SourcePath, StreamPlan};
