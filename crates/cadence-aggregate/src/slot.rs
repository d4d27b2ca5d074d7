//! Assignment of items to target slots.

use std::sync::Arc;

use cadence_calendar::TradingCalendar;
use cadence_types::{DateRange, Interval, IntervalUnit};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::{AggregateError, GroupingMode};

/// A target bar slot: a monotonically increasing key and the bar timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub(crate) key: i64,
    pub(crate) start: DateTime<Utc>,
}

/// Maps item timestamps to slots.
///
/// Keeps the per-day anchor and the calendar epoch between calls, so items
/// must be resolved in ascending timestamp order.
#[derive(Debug)]
pub(crate) struct SlotResolver {
    calendar: Option<Arc<dyn TradingCalendar>>,
    mode: GroupingMode,
    target: Interval,
    day_anchor: Option<(NaiveDate, DateTime<Utc>)>,
    epoch: Option<NaiveDate>,
    period: Option<(NaiveDate, Slot)>,
}

impl SlotResolver {
    pub(crate) const fn new(
        calendar: Option<Arc<dyn TradingCalendar>>,
        mode: GroupingMode,
        target: Interval,
    ) -> Self {
        Self {
            calendar,
            mode,
            target,
            day_anchor: None,
            epoch: None,
            period: None,
        }
    }

    pub(crate) fn resolve(&mut self, ts: DateTime<Utc>) -> Result<Slot, AggregateError> {
        match self.mode {
            GroupingMode::TimeWindow => Ok(self.time_window(ts)),
            GroupingMode::FixedChunk => self.fixed_chunk(ts),
            GroupingMode::Calendar => self.calendar_period(ts),
        }
    }

    fn width(&self) -> i64 {
        self.target.canonical_seconds() as i64
    }

    fn trading_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        self.calendar
            .as_ref()
            .map_or_else(|| ts.date_naive(), |calendar| calendar.trading_date(ts))
    }

    fn session_open(&self, date: NaiveDate) -> Result<Option<DateTime<Utc>>, AggregateError> {
        match &self.calendar {
            Some(calendar) => Ok(calendar.session_bounds(date)?.map(|bounds| bounds.open)),
            None => Ok(None),
        }
    }

    fn time_window(&self, ts: DateTime<Utc>) -> Slot {
        let width = self.width();
        let key = ts.timestamp().div_euclid(width) * width;
        Slot {
            key,
            start: DateTime::from_timestamp(key, 0).unwrap_or(ts),
        }
    }

    // Each trading day gets its own grid, anchored on the session open when a
    // calendar is attached and on the day's first item otherwise.
    fn fixed_chunk(&mut self, ts: DateTime<Utc>) -> Result<Slot, AggregateError> {
        let date = self.trading_date(ts);
        let anchor = match self.day_anchor {
            Some((anchor_date, anchor)) if anchor_date == date => anchor,
            _ => {
                let anchor = self.session_open(date)?.unwrap_or(ts);
                self.day_anchor = Some((date, anchor));
                anchor
            }
        };

        let width = self.width();
        let index = (ts - anchor).num_seconds().div_euclid(width);
        let start = anchor + TimeDelta::seconds(index * width);
        Ok(Slot {
            key: start.timestamp(),
            start,
        })
    }

    fn calendar_period(&mut self, ts: DateTime<Utc>) -> Result<Slot, AggregateError> {
        let date = self.trading_date(ts);
        match self.period {
            Some((cached, slot)) if cached == date => return Ok(slot),
            _ => {}
        }

        let epoch = *self.epoch.get_or_insert(date);
        let elapsed = self.elapsed_units(epoch, date)?;
        let key = elapsed.div_euclid(i64::from(self.target.multiplier()));
        let slot = match self.period {
            Some((_, previous)) if previous.key == key => previous,
            _ => Slot {
                key,
                start: self
                    .session_open(date)?
                    .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc()),
            },
        };
        self.period = Some((date, slot));
        Ok(slot)
    }

    fn elapsed_units(&self, epoch: NaiveDate, date: NaiveDate) -> Result<i64, AggregateError> {
        if self.target.unit() == IntervalUnit::Week {
            return Ok((week_start(date) - week_start(epoch)).num_days().div_euclid(7));
        }
        match (&self.calendar, DateRange::new(epoch, date)) {
            (Some(calendar), Ok(range)) => {
                let open_days = calendar.trading_days(range)?.len() as i64;
                let epoch_open = i64::from(calendar.is_trading_day(epoch)?);
                Ok(open_days - epoch_open)
            }
            _ => Ok((date - epoch).num_days()),
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
        .unwrap_or(date)
}
