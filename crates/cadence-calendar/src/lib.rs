//! Trading calendar and clock collaborators for cadence.
//!
//! The session engine never does wall-clock or time-zone math itself. It asks
//! a [`TradingCalendar`] for session bounds and trading dates, and a [`Clock`]
//! for the current instant.
//!
//! - [`ExchangeCalendar`] - Time-zone aware regular hours with holidays and early closes
//! - [`AlwaysOpenCalendar`] - 24/7 UTC sessions for crypto-style assets and tests
//! - [`WallClock`] / [`ManualClock`] - Live and test time sources

#![doc(issue_tracker_base_url = "https://github.com/factordynamics/cadence/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod calendar;
mod clock;
mod exchange;

pub use calendar::{CalendarError, MAX_TRADING_DAY_SCAN, SessionBounds, TradingCalendar};
pub use clock::{Clock, ManualClock, WallClock};
pub use exchange::{AlwaysOpenCalendar, ExchangeCalendar};
