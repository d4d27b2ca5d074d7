//! The OHLCV reduction core shared by every grouping mode.

use cadence_types::Bar;
use chrono::{DateTime, TimeDelta, Utc};

use crate::OhlcvItem;

/// Builder for one target bar.
#[derive(Debug, Clone)]
pub(crate) struct OhlcvBuilder {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    trade_count: Option<u32>,
    count: u64,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    continuous: bool,
}

impl OhlcvBuilder {
    /// Creates a new builder for the bar starting at `timestamp` from its first item.
    pub(crate) fn new<T: OhlcvItem>(timestamp: DateTime<Utc>, item: &T) -> Self {
        Self {
            timestamp,
            open: item.open(),
            high: item.high(),
            low: item.low(),
            close: item.close(),
            volume: item.volume(),
            trade_count: item.trade_count(),
            count: 1,
            first: item.timestamp(),
            last: item.timestamp(),
            continuous: true,
        }
    }

    /// Folds the next item into the bar.
    ///
    /// With a `step`, the builder remembers whether every item arrived
    /// exactly one step after the previous one.
    pub(crate) fn update<T: OhlcvItem>(&mut self, item: &T, step: Option<TimeDelta>) {
        if step.is_some_and(|step| item.timestamp() - self.last != step) {
            self.continuous = false;
        }
        self.high = self.high.max(item.high());
        self.low = self.low.min(item.low());
        self.close = item.close();
        self.volume += item.volume();
        self.trade_count = match (self.trade_count, item.trade_count()) {
            (Some(total), Some(count)) => Some(total.saturating_add(count)),
            _ => None,
        };
        self.count += 1;
        self.last = item.timestamp();
    }

    pub(crate) const fn count(&self) -> u64 {
        self.count
    }

    pub(crate) const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True if items were step-continuous and the first sat on the bar start.
    pub(crate) fn is_continuous(&self) -> bool {
        self.continuous && self.first == self.timestamp
    }

    /// Finishes building and returns the bar.
    pub(crate) fn finish(self, symbol: &str) -> Bar {
        let bar = Bar::new(
            symbol,
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        );
        match self.trade_count {
            Some(count) => bar.with_trade_count(count),
            None => bar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::Tick;
    use chrono::TimeZone;

    #[test]
    fn test_builder_reduces_ticks() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let ticks = [
            Tick::new(start, 100.0, 5.0),
            Tick::new(start + TimeDelta::seconds(10), 102.0, 3.0),
            Tick::new(start + TimeDelta::seconds(20), 99.0, 2.0),
            Tick::new(start + TimeDelta::seconds(30), 101.0, 1.0),
        ];

        let mut builder = OhlcvBuilder::new(start, &ticks[0]);
        for tick in &ticks[1..] {
            builder.update(tick, None);
        }
        assert_eq!(builder.count(), 4);
        let bar = builder.finish("AAPL");

        assert_eq!(bar.timestamp, start);
        assert!((bar.open - 100.0).abs() < 1e-10);
        assert!((bar.high - 102.0).abs() < 1e-10);
        assert!((bar.low - 99.0).abs() < 1e-10);
        assert!((bar.close - 101.0).abs() < 1e-10);
        assert!((bar.volume - 11.0).abs() < 1e-10);
        assert_eq!(bar.trade_count, Some(4));
    }

    #[test]
    fn test_builder_tracks_continuity() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let step = TimeDelta::minutes(1);
        let first = Bar::new("AAPL", start, 1.0, 1.0, 1.0, 1.0, 1.0);
        let skipped = Bar::new("AAPL", start + TimeDelta::minutes(2), 1.0, 1.0, 1.0, 1.0, 1.0);

        let mut builder = OhlcvBuilder::new(start, &first);
        assert!(builder.is_continuous());
        builder.update(&skipped, Some(step));
        assert!(!builder.is_continuous());
        // Bars without trade counts leave the total unknown
        assert_eq!(builder.finish("AAPL").trade_count, None);
    }
}
