//! Shared in-memory session state for the cadence session engine.
//!
//! - [`SessionStore`] - Lock-protected map of symbol sessions with an `active` flag
//! - [`SymbolSession`] - Base and derived series, history, rollups and the latest quote
//! - [`IntervalSeries`] - Bars of one interval with quality and gap metadata
//! - [`SessionSnapshot`] - Serializable complete or delta export

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod export;
mod series;
mod store;
mod symbol;

pub use export::{ExportMode, GapSummary, SeriesSnapshot, SessionSnapshot, SymbolSnapshot};
pub use series::IntervalSeries;
pub use store::{SessionError, SessionStore};
pub use symbol::{Registration, SymbolSession};
