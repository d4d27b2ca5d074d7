//! OHLCV aggregation for the cadence session engine.
//!
//! This crate turns base bars (or ticks) into derived bars:
//!
//! - [`BarAggregator`] - Batch reducer with three grouping modes and one core
//! - [`StreamingAggregator`] - Incremental form used while replaying
//! - [`AggregationRequest`] / [`GroupingMode`] - What to build and how to group
//! - [`OhlcvItem`] - Items the reducer accepts: [`Bar`](cadence_types::Bar)
//!   and [`Tick`](cadence_types::Tick)

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod aggregator;
mod builder;
mod item;
mod request;
mod slot;
mod streaming;

pub use aggregator::BarAggregator;
pub use item::OhlcvItem;
pub use request::{AggregateError, AggregationRequest, GroupingMode};
pub use streaming::{StreamEvent, StreamingAggregator};
