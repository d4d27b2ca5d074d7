//! Data quality for the cadence session engine.
//!
//! - [`GapEngine`] - Expected-count model, gap detection and the 100% completeness gate
//! - [`GapRecord`] - A run of missing bars, optionally resolved from a smaller interval
//! - [`QualityReport`] - Expected and present bar counts with the resulting quality

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod engine;
mod gap;

pub use engine::{GapEngine, GapFill, QualityError, QualityReport};
pub use gap::GapRecord;
