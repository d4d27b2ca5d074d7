//! Trading calendar interface.

use cadence_types::{CadenceError, DateRange};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of days scanned when looking for the next trading day.
pub const MAX_TRADING_DAY_SCAN: u64 = 366;

/// Opening and closing instants of one regular trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionBounds {
    /// Market open (UTC).
    pub open: DateTime<Utc>,
    /// Market close (UTC, exclusive).
    pub close: DateTime<Utc>,
}

impl SessionBounds {
    /// Creates session bounds.
    #[must_use]
    pub const fn new(open: DateTime<Utc>, close: DateTime<Utc>) -> Self {
        Self { open, close }
    }

    /// Returns the session length.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.close - self.open
    }

    /// Returns true if `ts` falls inside `[open, close)`.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.open && ts < self.close
    }
}

/// Errors raised by calendar implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// No trading day was found within the scan limit.
    #[error("No trading day within {scanned} days of {from}")]
    NoTradingDay {
        /// Date the scan started from.
        from: NaiveDate,
        /// Number of days scanned.
        scanned: u64,
    },

    /// A session boundary does not exist in the exchange time zone.
    #[error("Local time {time} on {date} does not exist in the exchange time zone")]
    InvalidLocalTime {
        /// The session date.
        date: NaiveDate,
        /// The local time that could not be resolved.
        time: NaiveTime,
    },

    /// An external calendar source failed.
    #[error("Calendar unavailable: {0}")]
    Unavailable(String),
}

impl From<CalendarError> for CadenceError {
    fn from(err: CalendarError) -> Self {
        Self::Calendar(err.to_string())
    }
}

/// The calendar/time authority consulted for all session-day and
/// expected-bar-count math.
///
/// Implementations only need to answer [`session_bounds`](Self::session_bounds),
/// [`is_holiday`](Self::is_holiday) and [`trading_date`](Self::trading_date);
/// everything else is derived.
pub trait TradingCalendar: Send + Sync + std::fmt::Debug {
    /// Returns the regular session for `date`, or `None` if the market is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar cannot answer for that date.
    fn session_bounds(&self, date: NaiveDate) -> Result<Option<SessionBounds>, CalendarError>;

    /// Returns true if `date` is an exchange holiday.
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar cannot answer for that date.
    fn is_holiday(&self, date: NaiveDate) -> Result<bool, CalendarError>;

    /// Returns the exchange-local trading date of an instant.
    fn trading_date(&self, ts: DateTime<Utc>) -> NaiveDate;

    /// Returns the UTC instants `[start, end)` whose trading date is `date`.
    ///
    /// The default is the UTC calendar day.
    ///
    /// # Errors
    ///
    /// Returns an error if the day boundaries cannot be resolved.
    fn day_window(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Ok((start, start + TimeDelta::days(1)))
    }

    /// Returns the UTC instants `[start, end)` whose trading date falls in `range`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`day_window`](Self::day_window).
    fn range_window(
        &self,
        range: DateRange,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
        let (start, _) = self.day_window(range.start)?;
        let (_, end) = self.day_window(range.end)?;
        Ok((start, end))
    }

    /// Returns true if the market has a regular session on `date`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`session_bounds`](Self::session_bounds).
    fn is_trading_day(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        Ok(self.session_bounds(date)?.is_some())
    }

    /// Returns the first trading day strictly after `date`.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::NoTradingDay`] if none is found within
    /// [`MAX_TRADING_DAY_SCAN`] days.
    fn next_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let mut current = date;
        for _ in 0..MAX_TRADING_DAY_SCAN {
            current = current
                .checked_add_days(Days::new(1))
                .ok_or(CalendarError::NoTradingDay {
                    from: date,
                    scanned: MAX_TRADING_DAY_SCAN,
                })?;
            if self.is_trading_day(current)? {
                return Ok(current);
            }
        }
        Err(CalendarError::NoTradingDay {
            from: date,
            scanned: MAX_TRADING_DAY_SCAN,
        })
    }

    /// Returns the last trading day strictly before `date`.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::NoTradingDay`] if none is found within
    /// [`MAX_TRADING_DAY_SCAN`] days.
    fn previous_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let mut current = date;
        for _ in 0..MAX_TRADING_DAY_SCAN {
            current = current
                .checked_sub_days(Days::new(1))
                .ok_or(CalendarError::NoTradingDay {
                    from: date,
                    scanned: MAX_TRADING_DAY_SCAN,
                })?;
            if self.is_trading_day(current)? {
                return Ok(current);
            }
        }
        Err(CalendarError::NoTradingDay {
            from: date,
            scanned: MAX_TRADING_DAY_SCAN,
        })
    }

    /// Returns true if `ts` falls inside its trading date's regular session.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`session_bounds`](Self::session_bounds).
    fn is_regular_hours(&self, ts: DateTime<Utc>) -> Result<bool, CalendarError> {
        Ok(self
            .session_bounds(self.trading_date(ts))?
            .is_some_and(|bounds| bounds.contains(ts)))
    }

    /// Returns every trading day in `range`, in order.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`session_bounds`](Self::session_bounds).
    fn trading_days(&self, range: DateRange) -> Result<Vec<NaiveDate>, CalendarError> {
        let mut days = Vec::new();
        for date in range.days() {
            if self.is_trading_day(date)? {
                days.push(date);
            }
        }
        Ok(days)
    }

    /// Returns the `count` trading days immediately before `date`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`previous_trading_day`](Self::previous_trading_day).
    fn trailing_trading_days(
        &self,
        date: NaiveDate,
        count: usize,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        let mut days = Vec::with_capacity(count);
        let mut current = date;
        for _ in 0..count {
            current = self.previous_trading_day(current)?;
            days.push(current);
        }
        days.reverse();
        Ok(days)
    }
}
