//! Exchange calendars.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{CalendarError, SessionBounds, TradingCalendar};

/// A time-zone aware exchange calendar with fixed regular hours.
///
/// Sessions open at `open` and close at `close` exchange-local time on each
/// trading weekday, except holidays. Early closes replace the closing time
/// for specific dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeCalendar {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
    #[serde(default = "default_weekdays")]
    weekdays: Vec<Weekday>,
    #[serde(default)]
    holidays: BTreeSet<NaiveDate>,
    #[serde(default)]
    early_closes: BTreeMap<NaiveDate, NaiveTime>,
}

fn default_weekdays() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

impl ExchangeCalendar {
    /// Creates a Monday to Friday calendar with the given local session hours.
    #[must_use]
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            timezone,
            open,
            close,
            weekdays: default_weekdays(),
            holidays: BTreeSet::new(),
            early_closes: BTreeMap::new(),
        }
    }

    /// US equity regular hours: 09:30 to 16:00 America/New_York.
    #[must_use]
    pub fn us_equity() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
        )
    }

    /// Adds a full-day holiday.
    #[must_use]
    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.holidays.insert(date);
        self
    }

    /// Adds holidays in bulk.
    #[must_use]
    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    /// Closes the session early on `date`.
    #[must_use]
    pub fn with_early_close(mut self, date: NaiveDate, close: NaiveTime) -> Self {
        self.early_closes.insert(date, close);
        self
    }

    /// Replaces the set of trading weekdays.
    #[must_use]
    pub fn with_weekdays(mut self, weekdays: Vec<Weekday>) -> Self {
        self.weekdays = weekdays;
        self
    }

    /// Returns the exchange time zone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Returns the regular local opening time.
    #[must_use]
    pub const fn open_time(&self) -> NaiveTime {
        self.open
    }

    /// Returns the regular local closing time.
    #[must_use]
    pub const fn close_time(&self) -> NaiveTime {
        self.close
    }

    fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, CalendarError> {
        // Ambiguous local times (DST fall-back) resolve to the earlier instant.
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or(CalendarError::InvalidLocalTime { date, time })
    }

    // Zones that shift their clocks at midnight start the day at 01:00.
    fn day_start(&self, date: NaiveDate) -> Result<DateTime<Utc>, CalendarError> {
        self.to_utc(date, NaiveTime::MIN).or_else(|_| {
            let one_am = NaiveTime::from_hms_opt(1, 0, 0).unwrap_or(NaiveTime::MIN);
            self.to_utc(date, one_am)
        })
    }
}

impl TradingCalendar for ExchangeCalendar {
    fn session_bounds(&self, date: NaiveDate) -> Result<Option<SessionBounds>, CalendarError> {
        if !self.weekdays.contains(&date.weekday()) || self.holidays.contains(&date) {
            return Ok(None);
        }
        let close_time = self.early_closes.get(&date).copied().unwrap_or(self.close);
        let open = self.to_utc(date, self.open)?;
        let close = self.to_utc(date, close_time)?;
        Ok(Some(SessionBounds::new(open, close)))
    }

    fn is_holiday(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        Ok(self.holidays.contains(&date))
    }

    fn trading_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.timezone).date_naive()
    }

    fn day_window(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), CalendarError> {
        let next = date.succ_opt().ok_or(CalendarError::InvalidLocalTime {
            date,
            time: NaiveTime::MIN,
        })?;
        Ok((self.day_start(date)?, self.day_start(next)?))
    }
}

/// A calendar that trades every day around the clock, in UTC.
///
/// Each session runs from midnight to the following midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysOpenCalendar;

impl TradingCalendar for AlwaysOpenCalendar {
    fn session_bounds(&self, date: NaiveDate) -> Result<Option<SessionBounds>, CalendarError> {
        let open = date.and_time(NaiveTime::MIN).and_utc();
        let close = date
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN).and_utc())
            .ok_or(CalendarError::InvalidLocalTime {
                date,
                time: NaiveTime::MIN,
            })?;
        Ok(Some(SessionBounds::new(open, close)))
    }

    fn is_holiday(&self, _date: NaiveDate) -> Result<bool, CalendarError> {
        Ok(false)
    }

    fn trading_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::DateRange;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_us_equity_session_bounds() {
        let calendar = ExchangeCalendar::us_equity();

        // January: EST, UTC-5
        let bounds = calendar.session_bounds(date(2024, 1, 2)).unwrap().unwrap();
        assert_eq!(bounds.open, Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap());
        assert_eq!(bounds.close, Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap());

        // July: EDT, UTC-4
        let bounds = calendar.session_bounds(date(2024, 7, 1)).unwrap().unwrap();
        assert_eq!(bounds.open, Utc.with_ymd_and_hms(2024, 7, 1, 13, 30, 0).unwrap());
        assert_eq!(bounds.duration().num_minutes(), 390);
    }

    #[test]
    fn test_weekends_and_holidays_closed() {
        let calendar = ExchangeCalendar::us_equity().with_holiday(date(2024, 1, 1));

        assert!(calendar.session_bounds(date(2024, 1, 6)).unwrap().is_none());
        assert!(calendar.session_bounds(date(2024, 1, 1)).unwrap().is_none());
        assert!(calendar.is_holiday(date(2024, 1, 1)).unwrap());
        assert!(!calendar.is_holiday(date(2024, 1, 6)).unwrap());
        assert!(!calendar.is_trading_day(date(2024, 1, 7)).unwrap());
        assert!(calendar.is_trading_day(date(2024, 1, 2)).unwrap());
    }

    #[test]
    fn test_early_close() {
        let calendar = ExchangeCalendar::us_equity()
            .with_early_close(date(2024, 11, 29), NaiveTime::from_hms_opt(13, 0, 0).unwrap());

        let bounds = calendar.session_bounds(date(2024, 11, 29)).unwrap().unwrap();
        assert_eq!(bounds.close, Utc.with_ymd_and_hms(2024, 11, 29, 18, 0, 0).unwrap());
        assert_eq!(bounds.duration().num_minutes(), 210);
    }

    #[test]
    fn test_next_and_previous_trading_day() {
        let calendar = ExchangeCalendar::us_equity().with_holiday(date(2024, 1, 15));

        // Friday -> Tuesday, skipping the weekend and the Monday holiday
        assert_eq!(calendar.next_trading_day(date(2024, 1, 12)).unwrap(), date(2024, 1, 16));
        assert_eq!(
            calendar.previous_trading_day(date(2024, 1, 16)).unwrap(),
            date(2024, 1, 12)
        );
    }

    #[test]
    fn test_no_trading_day() {
        let calendar = ExchangeCalendar::us_equity().with_weekdays(Vec::new());
        assert!(matches!(
            calendar.next_trading_day(date(2024, 1, 1)),
            Err(CalendarError::NoTradingDay { .. })
        ));
    }

    #[test]
    fn test_regular_hours_and_trading_date() {
        let calendar = ExchangeCalendar::us_equity();
        let open = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let before_open = Utc.with_ymd_and_hms(2024, 1, 2, 14, 29, 0).unwrap();
        let close = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let late_evening = Utc.with_ymd_and_hms(2024, 1, 3, 2, 0, 0).unwrap();

        assert!(calendar.is_regular_hours(open).unwrap());
        assert!(!calendar.is_regular_hours(before_open).unwrap());
        assert!(!calendar.is_regular_hours(close).unwrap());
        // 21:00 New York on Jan 2 is 02:00 UTC on Jan 3
        assert_eq!(calendar.trading_date(late_evening), date(2024, 1, 2));
    }

    #[test]
    fn test_day_window_follows_exchange_time_zone() {
        let sydney = ExchangeCalendar::new(
            chrono_tz::Australia::Sydney,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        );
        // AEDT, UTC+11: Jan 3 local starts at 13:00 UTC on Jan 2
        let (start, end) = sydney.day_window(date(2024, 1, 3)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 2, 13, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 3, 13, 0, 0).unwrap());

        let open = sydney.session_bounds(date(2024, 1, 3)).unwrap().unwrap().open;
        assert!(open >= start && open < end);
        assert_eq!(sydney.trading_date(start), date(2024, 1, 3));
        assert_eq!(sydney.trading_date(end), date(2024, 1, 4));

        let range = DateRange::new(date(2024, 1, 3), date(2024, 1, 4)).unwrap();
        let (start, end) = sydney.range_window(range).unwrap();
        assert_eq!((end - start).num_hours(), 48);

        let (start, end) = AlwaysOpenCalendar.day_window(date(2024, 1, 3)).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        assert_eq!((end - start).num_hours(), 24);
    }

    #[test]
    fn test_trading_days_and_trailing() {
        let calendar = ExchangeCalendar::us_equity();
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 14)).unwrap();

        assert_eq!(calendar.trading_days(range).unwrap().len(), 10);
        assert_eq!(
            calendar.trailing_trading_days(date(2024, 1, 8), 3).unwrap(),
            vec![date(2024, 1, 3), date(2024, 1, 4), date(2024, 1, 5)]
        );
    }

    #[test]
    fn test_always_open() {
        let calendar = AlwaysOpenCalendar;
        let bounds = calendar.session_bounds(date(2024, 1, 6)).unwrap().unwrap();

        assert_eq!(bounds.duration().num_hours(), 24);
        assert!(
            calendar
                .is_regular_hours(Utc.with_ymd_and_hms(2024, 1, 6, 23, 59, 59).unwrap())
                .unwrap()
        );
        assert_eq!(calendar.next_trading_day(date(2024, 1, 6)).unwrap(), date(2024, 1, 7));
    }

    #[test]
    fn test_calendar_serde() {
        let calendar = ExchangeCalendar::us_equity().with_holiday(date(2024, 7, 4));
        let json = serde_json::to_string(&calendar).unwrap();
        let parsed: ExchangeCalendar = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, calendar);

        let minimal: ExchangeCalendar = serde_json::from_str(
            r#"{"timezone":"Europe/London","open":"08:00:00","close":"16:30:00"}"#,
        )
        .unwrap();
        assert!(minimal.is_trading_day(date(2024, 1, 2)).unwrap());
        assert_eq!(minimal.timezone(), chrono_tz::Europe::London);
    }
}
