//! Batch bar aggregation.

use std::sync::Arc;

use cadence_calendar::TradingCalendar;
use cadence_types::Bar;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::builder::OhlcvBuilder;
use crate::slot::{Slot, SlotResolver};
use crate::{AggregateError, AggregationRequest, GroupingMode, OhlcvItem};

/// Generic OHLCV reducer.
///
/// Groups items by the request's [`GroupingMode`] and reduces each group with
/// one core: first open, max high, min low, last close, summed volume. Trade
/// counts are summed when every item carries one.
///
/// Items must arrive in ascending timestamp order. Malformed items, and items
/// not strictly after their predecessor, are logged and skipped.
#[derive(Debug, Clone, Default)]
pub struct BarAggregator {
    calendar: Option<Arc<dyn TradingCalendar>>,
}

impl BarAggregator {
    /// Creates an aggregator that counts calendar days and UTC dates.
    #[must_use]
    pub const fn new() -> Self {
        Self { calendar: None }
    }

    /// Creates an aggregator that uses `calendar` for trading dates, session
    /// anchors and trading-day counts.
    #[must_use]
    pub fn with_calendar(calendar: Arc<dyn TradingCalendar>) -> Self {
        Self {
            calendar: Some(calendar),
        }
    }

    /// Returns the attached calendar, if any.
    #[must_use]
    pub const fn calendar(&self) -> Option<&Arc<dyn TradingCalendar>> {
        self.calendar.as_ref()
    }

    pub(crate) fn resolver(&self, request: &AggregationRequest) -> SlotResolver {
        SlotResolver::new(self.calendar.clone(), request.mode, request.target)
    }

    /// Aggregates `items` into bars of `request.target`.
    ///
    /// Identical input always yields identical output.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Incompatible`] if the request cannot be
    /// satisfied, or a calendar error if a session lookup fails.
    pub fn aggregate<T: OhlcvItem>(
        &self,
        items: &[T],
        request: &AggregationRequest,
    ) -> Result<Vec<Bar>, AggregateError> {
        request.validate()?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut resolver = self.resolver(request);
        let step = request
            .source
            .filter(|_| request.mode == GroupingMode::FixedChunk)
            .map(|source| source.duration());
        let mut bars = Vec::new();
        let mut current: Option<(Slot, OhlcvBuilder)> = None;
        let mut last: Option<DateTime<Utc>> = None;

        for (index, item) in items.iter().enumerate() {
            if let Err(err) = item.check() {
                warn!(symbol = %request.symbol, index, error = %err, "Skipping malformed item");
                continue;
            }
            let timestamp = item.timestamp();
            if last.is_some_and(|last| timestamp <= last) {
                warn!(symbol = %request.symbol, index, %timestamp, "Skipping out-of-order item");
                continue;
            }
            last = Some(timestamp);

            let slot = resolver.resolve(timestamp)?;
            let same_slot = current.as_ref().is_some_and(|(open, _)| open.key == slot.key);
            if same_slot {
                if let Some((_, builder)) = current.as_mut() {
                    builder.update(item, step);
                }
            } else if let Some((_, done)) =
                current.replace((slot, OhlcvBuilder::new(slot.start, item)))
            {
                if let Some(bar) = close_group(done, request) {
                    bars.push(bar);
                }
            }
        }

        if let Some(bar) = current.and_then(|(_, done)| close_group(done, request)) {
            bars.push(bar);
        }
        Ok(bars)
    }
}

fn close_group(builder: OhlcvBuilder, request: &AggregationRequest) -> Option<Bar> {
    if request.mode == GroupingMode::FixedChunk {
        let expected = request.chunk_size().unwrap_or(0);
        let complete = builder.count() == expected;
        let continuous = builder.is_continuous();
        if (request.require_complete && !complete) || (request.check_continuity && !continuous)
        {
            debug!(
                symbol = %request.symbol,
                target = %request.target,
                start = %builder.timestamp(),
                received = builder.count(),
                expected,
                continuous,
                "Dropping incomplete chunk"
            );
            return None;
        }
    }
    Some(builder.finish(&request.symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadence_calendar::ExchangeCalendar;
    use cadence_types::{Interval, Tick};
    use chrono::{TimeDelta, TimeZone};

    fn iv(s: &str) -> Interval {
        s.parse().unwrap()
    }

    fn bars_from(start: DateTime<Utc>, step: TimeDelta, closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let open = close - 0.5;
                Bar::new(
                    "AAPL",
                    start + step * i as i32,
                    open,
                    close + 1.0,
                    open - 1.0,
                    *close,
                    10.0 + i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn test_sixty_seconds_make_one_minute() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + f64::from(i) * 0.1).collect();
        let seconds = bars_from(start, TimeDelta::seconds(1), &closes);
        let request = AggregationRequest::new("AAPL", iv("1s"), iv("1m"));

        let bars = BarAggregator::new().aggregate(&seconds, &request).unwrap();

        assert_eq!(bars.len(), 1);
        let bar = &bars[0];
        assert_eq!(bar.timestamp, start);
        assert_relative_eq!(bar.open, seconds[0].open);
        assert_relative_eq!(bar.close, seconds[59].close);
        assert_relative_eq!(
            bar.high,
            seconds.iter().map(|b| b.high).fold(f64::MIN, f64::max)
        );
        assert_relative_eq!(
            bar.low,
            seconds.iter().map(|b| b.low).fold(f64::MAX, f64::min)
        );
        assert_relative_eq!(bar.volume, seconds.iter().map(|b| b.volume).sum::<f64>());
    }

    #[test]
    fn test_fixed_chunk_correctness() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + f64::from(i % 7)).collect();
        let minutes = bars_from(start, TimeDelta::minutes(1), &closes);
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("5m"));

        let bars = BarAggregator::new().aggregate(&minutes, &request).unwrap();

        assert_eq!(bars.len(), 6);
        for (k, bar) in bars.iter().enumerate() {
            let chunk = &minutes[k * 5..(k + 1) * 5];
            assert_eq!(bar.timestamp, chunk[0].timestamp);
            assert_relative_eq!(bar.open, chunk[0].open);
            assert_relative_eq!(bar.close, chunk[4].close);
            assert_relative_eq!(bar.high, chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max));
            assert_relative_eq!(bar.low, chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min));
            assert_relative_eq!(bar.volume, chunk.iter().map(|b| b.volume).sum::<f64>());
        }
    }

    #[test]
    fn test_incomplete_chunk_dropped() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut minutes = bars_from(start, TimeDelta::minutes(1), &[10.0; 10]);
        // Lose 14:37: second chunk is incomplete
        minutes.remove(7);
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("5m"));

        let bars = BarAggregator::new().aggregate(&minutes, &request).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, start);

        // Relaxed: partial chunk emitted
        let relaxed = request
            .with_require_complete(false)
            .with_check_continuity(false);
        let bars = BarAggregator::new().aggregate(&minutes, &relaxed).unwrap();
        assert_eq!(bars.len(), 2);
        assert_relative_eq!(bars[1].volume, 15.0 + 16.0 + 18.0 + 19.0);
    }

    #[test]
    fn test_realigns_after_gap() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut minutes = bars_from(start, TimeDelta::minutes(1), &[10.0; 15]);
        // Drop 14:33..=14:36 entirely
        minutes.drain(3..7);
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("5m"));

        let bars = BarAggregator::new().aggregate(&minutes, &request).unwrap();
        let starts: Vec<_> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(starts, vec![start + TimeDelta::minutes(10)]);
    }

    #[test]
    fn test_malformed_and_out_of_order_skipped() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let mut minutes = bars_from(start, TimeDelta::minutes(1), &[10.0; 5]);
        minutes[2].high = f64::NAN;
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("5m"));

        assert!(BarAggregator::new().aggregate(&minutes, &request).unwrap().is_empty());

        let relaxed = request
            .with_require_complete(false)
            .with_check_continuity(false);
        let mut shuffled = bars_from(start, TimeDelta::minutes(1), &[10.0; 5]);
        shuffled.swap(1, 3);
        let bars = BarAggregator::new().aggregate(&shuffled, &relaxed).unwrap();
        // 14:33 is kept, 14:32 and 14:31 arrive late and are dropped
        assert_eq!(bars.len(), 1);
        assert_relative_eq!(bars[0].volume, 10.0 + 13.0 + 14.0);
    }

    #[test]
    fn test_time_window_ticks() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let ticks = vec![
            Tick::new(start + TimeDelta::milliseconds(100), 10.0, 1.0),
            Tick::new(start + TimeDelta::milliseconds(900), 11.0, 2.0),
            Tick::new(start + TimeDelta::milliseconds(2500), 9.0, 3.0),
        ];
        let request = AggregationRequest::from_ticks("AAPL", iv("1s"));

        let bars = BarAggregator::new().aggregate(&ticks, &request).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, start);
        assert_eq!(bars[0].trade_count, Some(2));
        assert_relative_eq!(bars[0].high, 11.0);
        assert_eq!(bars[1].timestamp, start + TimeDelta::seconds(2));
    }

    #[test]
    fn test_calendar_days_from_minutes() {
        let calendar = Arc::new(ExchangeCalendar::us_equity());
        let aggregator = BarAggregator::with_calendar(calendar);
        let day_one = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 1, 3, 14, 30, 0).unwrap();
        let mut minutes = bars_from(day_one, TimeDelta::minutes(1), &[10.0, 11.0, 12.0]);
        minutes.extend(bars_from(day_two, TimeDelta::minutes(1), &[20.0, 21.0]));
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("1d"));

        let bars = aggregator.aggregate(&minutes, &request).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, day_one);
        assert_relative_eq!(bars[0].close, 12.0);
        assert_eq!(bars[1].timestamp, day_two);
        assert_relative_eq!(bars[1].open, 19.5);
    }

    #[test]
    fn test_calendar_multi_day_skips_weekend() {
        let calendar = Arc::new(ExchangeCalendar::us_equity());
        let aggregator = BarAggregator::with_calendar(calendar);
        // Mon Jan 1 .. Fri Jan 12, weekdays only
        let days: Vec<u32> = vec![1, 2, 3, 4, 5, 8, 9, 10, 11, 12];
        let daily: Vec<Bar> = days
            .iter()
            .map(|d| {
                let ts = Utc.with_ymd_and_hms(2024, 1, *d, 14, 30, 0).unwrap();
                Bar::new("AAPL", ts, 1.0, 2.0, 0.5, 1.5, f64::from(*d))
            })
            .collect();
        let request = AggregationRequest::new("AAPL", iv("1d"), iv("5d"));

        let bars = aggregator.aggregate(&daily, &request).unwrap();

        assert_eq!(bars.len(), 2);
        assert_relative_eq!(bars[0].volume, 1.0 + 2.0 + 3.0 + 4.0 + 5.0);
        assert_relative_eq!(bars[1].volume, 8.0 + 9.0 + 10.0 + 11.0 + 12.0);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let closes: Vec<f64> = (0..45).map(|i| 100.0 + f64::from(i).sin()).collect();
        let minutes = bars_from(start, TimeDelta::minutes(1), &closes);
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("15m"));
        let aggregator = BarAggregator::new();

        let first = aggregator.aggregate(&minutes, &request).unwrap();
        let second = aggregator.aggregate(&minutes, &request).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_empty_and_incompatible() {
        let aggregator = BarAggregator::new();
        let request = AggregationRequest::new("AAPL", iv("1m"), iv("5m"));
        assert!(aggregator.aggregate::<Bar>(&[], &request).unwrap().is_empty());

        let backwards = AggregationRequest::new("AAPL", iv("5m"), iv("1m"));
        assert!(matches!(
            aggregator.aggregate::<Bar>(&[], &backwards),
            Err(AggregateError::Incompatible { .. })
        ));
    }
}
