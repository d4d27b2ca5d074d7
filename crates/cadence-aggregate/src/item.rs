//! Items the aggregator can reduce.

use cadence_types::{Bar, BarError, Tick};
use chrono::{DateTime, Utc};

/// Anything with a timestamp and OHLCV values.
///
/// Bars report their own fields; a tick is a degenerate bar whose four
/// prices equal the trade price and whose volume is the trade size.
pub trait OhlcvItem {
    /// Item timestamp (UTC).
    fn timestamp(&self) -> DateTime<Utc>;
    /// Opening price.
    fn open(&self) -> f64;
    /// Highest price.
    fn high(&self) -> f64;
    /// Lowest price.
    fn low(&self) -> f64;
    /// Closing price.
    fn close(&self) -> f64;
    /// Traded volume.
    fn volume(&self) -> f64;
    /// Number of trades, if known.
    fn trade_count(&self) -> Option<u32>;

    /// Checks that the item is well formed.
    ///
    /// # Errors
    ///
    /// Returns the first violated OHLCV invariant.
    fn check(&self) -> Result<(), BarError>;
}

impl OhlcvItem for Bar {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn trade_count(&self) -> Option<u32> {
        self.trade_count
    }

    fn check(&self) -> Result<(), BarError> {
        self.validate()
    }
}

impl OhlcvItem for Tick {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.price
    }

    fn high(&self) -> f64 {
        self.price
    }

    fn low(&self) -> f64 {
        self.price
    }

    fn close(&self) -> f64 {
        self.price
    }

    fn volume(&self) -> f64 {
        self.size
    }

    fn trade_count(&self) -> Option<u32> {
        Some(1)
    }

    fn check(&self) -> Result<(), BarError> {
        if !self.price.is_finite() {
            return Err(BarError::NonFinite {
                field: "price",
                value: self.price,
            });
        }
        if !self.size.is_finite() {
            return Err(BarError::NonFinite {
                field: "size",
                value: self.size,
            });
        }
        if self.size < 0.0 {
            return Err(BarError::NegativeVolume(self.size));
        }
        Ok(())
    }
}

impl<T: OhlcvItem + ?Sized> OhlcvItem for &T {
    fn timestamp(&self) -> DateTime<Utc> {
        (**self).timestamp()
    }

    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }

    fn trade_count(&self) -> Option<u32> {
        (**self).trade_count()
    }

    fn check(&self) -> Result<(), BarError> {
        (**self).check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tick_as_item() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let tick = Tick::new(ts, 101.5, 300.0);

        assert_eq!(tick.timestamp(), ts);
        assert!((tick.high() - 101.5).abs() < 1e-10);
        assert!((tick.volume() - 300.0).abs() < 1e-10);
        assert_eq!(tick.trade_count(), Some(1));
        assert!(tick.check().is_ok());
    }

    #[test]
    fn test_malformed_tick() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();

        assert!(matches!(
            Tick::new(ts, f64::NAN, 1.0).check(),
            Err(BarError::NonFinite { field: "price", .. })
        ));
        assert!(matches!(
            Tick::new(ts, 100.0, -1.0).check(),
            Err(BarError::NegativeVolume(_))
        ));
    }
}
