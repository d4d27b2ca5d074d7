//! Availability probing.

use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_calendar::TradingCalendar;
use cadence_types::{DateRange, Interval};
use serde::Serialize;
use tracing::debug;

use crate::{Availability, BarStore, StorageError};

/// What storage holds for one symbol over one date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    /// Symbol probed.
    pub symbol: String,
    /// Date range probed.
    pub range: DateRange,
    /// Availability per probed interval.
    pub intervals: BTreeMap<Interval, Availability>,
}

impl AvailabilityReport {
    /// Returns true if `interval` has stored bars in the range.
    #[must_use]
    pub fn is_stored(&self, interval: Interval) -> bool {
        self.intervals
            .get(&interval)
            .is_some_and(|availability| availability.present)
    }

    /// Returns the smallest stored base interval (`1s`, then `1m`, then `1d`).
    #[must_use]
    pub fn smallest_base(&self) -> Option<Interval> {
        Interval::STORAGE_BASES
            .into_iter()
            .find(|base| self.is_stored(*base))
    }

    /// Returns every stored interval, smallest first.
    #[must_use]
    pub fn stored(&self) -> Vec<Interval> {
        self.intervals
            .iter()
            .filter(|(_, availability)| availability.present)
            .map(|(interval, _)| *interval)
            .collect()
    }

    /// Fraction of the range's calendar days between the first and last
    /// stored dates, in `[0, 1]`.
    #[must_use]
    pub fn coverage_ratio(&self, interval: Interval) -> f64 {
        self.intervals
            .get(&interval)
            .and_then(|availability| availability.coverage)
            .and_then(|coverage| coverage.intersection(&self.range))
            .map_or(0.0, |covered| {
                covered.total_days() as f64 / self.range.total_days() as f64
            })
    }
}

/// Read-only storage query wrapper.
///
/// Without a calendar, dates are UTC dates. With one, a bar counts toward
/// the exchange trading date it falls on.
#[derive(Debug, Clone)]
pub struct AvailabilityProbe {
    store: Arc<dyn BarStore>,
    calendar: Option<Arc<dyn TradingCalendar>>,
}

impl AvailabilityProbe {
    /// Creates a probe over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BarStore>) -> Self {
        Self {
            store,
            calendar: None,
        }
    }

    /// Resolves dates through `calendar`.
    #[must_use]
    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BarStore> {
        &self.store
    }

    /// Probes the storage base intervals plus any `extra` intervals.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn probe(
        &self,
        symbol: &str,
        range: DateRange,
        extra: &[Interval],
    ) -> Result<AvailabilityReport, StorageError> {
        let mut intervals = BTreeMap::new();
        for interval in Interval::STORAGE_BASES.iter().chain(extra) {
            if intervals.contains_key(interval) {
                continue;
            }
            intervals.insert(*interval, self.availability(symbol, *interval, range)?);
        }
        let report = AvailabilityReport {
            symbol: symbol.to_string(),
            range,
            intervals,
        };
        debug!(
            symbol,
            %range,
            smallest_base = ?report.smallest_base().map(|base| base.to_string()),
            stored = report.stored().len(),
            "Probed availability"
        );
        Ok(report)
    }

    /// Returns true if `interval` is stored for `symbol` anywhere in `range`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn has_interval(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<bool, StorageError> {
        Ok(self.availability(symbol, interval, range)?.present)
    }

    fn availability(
        &self,
        symbol: &str,
        interval: Interval,
        range: DateRange,
    ) -> Result<Availability, StorageError> {
        let Some(calendar) = &self.calendar else {
            return self.store.check_availability(symbol, interval, range);
        };
        let (start, end) = calendar.range_window(range)?;
        let Some((first, last)) = self.store.stored_span(symbol, interval, start, end)? else {
            return Ok(Availability::ABSENT);
        };
        let coverage =
            DateRange::new(calendar.trading_date(first), calendar.trading_date(last)).ok();
        Ok(Availability {
            present: coverage.is_some(),
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBarStore;
    use cadence_calendar::ExchangeCalendar;
    use cadence_types::Bar;
    use chrono::{NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store_with(symbol: &str, interval: Interval, days: &[u32]) -> InMemoryBarStore {
        let store = InMemoryBarStore::new();
        for day in days {
            let start = Utc.with_ymd_and_hms(2024, 1, *day, 14, 30, 0).unwrap();
            let bars = (0..3).map(|i| {
                Bar::new(symbol, start + TimeDelta::minutes(i), 10.0, 11.0, 9.0, 10.5, 1.0)
            });
            store.insert(symbol, interval, bars).unwrap();
        }
        store
    }

    #[test]
    fn test_probe_smallest_base() {
        let store = store_with("AAPL", Interval::ONE_MINUTE, &[2, 3]);
        store
            .insert(
                "AAPL",
                Interval::ONE_DAY,
                [Bar::new(
                    "AAPL",
                    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                    10.0,
                    11.0,
                    9.0,
                    10.5,
                    100.0,
                )],
            )
            .unwrap();
        let probe = AvailabilityProbe::new(Arc::new(store));

        let range = DateRange::new(date(2024, 1, 2), date(2024, 1, 3)).unwrap();
        let report = probe.probe("AAPL", range, &[]).unwrap();

        assert_eq!(report.smallest_base(), Some(Interval::ONE_MINUTE));
        assert!(!report.is_stored(Interval::ONE_SECOND));
        assert_eq!(report.stored(), vec![Interval::ONE_MINUTE, Interval::ONE_DAY]);
        assert!((report.coverage_ratio(Interval::ONE_MINUTE) - 1.0).abs() < 1e-10);
        assert!((report.coverage_ratio(Interval::ONE_DAY) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_probe_extra_interval() {
        let five = Interval::minutes(5).unwrap();
        let store = store_with("AAPL", five, &[2]);
        let probe = AvailabilityProbe::new(Arc::new(store));
        let range = DateRange::single_day(date(2024, 1, 2));

        let report = probe.probe("AAPL", range, &[five, Interval::ONE_MINUTE]).unwrap();
        assert!(report.is_stored(five));
        assert_eq!(report.smallest_base(), None);
        assert_eq!(report.intervals.len(), 4);
        assert!(probe.has_interval("AAPL", five, range).unwrap());
    }

    #[test]
    fn test_availability_uses_exchange_trading_dates() {
        // 10:00 AEDT on Jan 3 is 23:00 UTC on Jan 2
        let open = Utc.with_ymd_and_hms(2024, 1, 2, 23, 0, 0).unwrap();
        let store = InMemoryBarStore::new();
        let bars = (0..3).map(|i| {
            Bar::new("BHP", open + TimeDelta::minutes(i), 10.0, 11.0, 9.0, 10.5, 1.0)
        });
        store.insert("BHP", Interval::ONE_MINUTE, bars).unwrap();
        let store: Arc<dyn BarStore> = Arc::new(store);
        let jan_3 = DateRange::single_day(date(2024, 1, 3));

        let utc = AvailabilityProbe::new(Arc::clone(&store));
        assert!(!utc.has_interval("BHP", Interval::ONE_MINUTE, jan_3).unwrap());

        let calendar = ExchangeCalendar::new(
            chrono_tz::Australia::Sydney,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        );
        let sydney = AvailabilityProbe::new(store).with_calendar(Arc::new(calendar));
        let report = sydney.probe("BHP", jan_3, &[]).unwrap();
        assert_eq!(report.smallest_base(), Some(Interval::ONE_MINUTE));
        assert_eq!(report.intervals[&Interval::ONE_MINUTE].coverage, Some(jan_3));
        assert!(
            !sydney
                .has_interval("BHP", Interval::ONE_MINUTE, DateRange::single_day(date(2024, 1, 2)))
                .unwrap()
        );
    }
}
