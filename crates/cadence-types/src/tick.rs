//! Trade tick and quote representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Bar;

/// A single trade print.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Timestamp of the trade (UTC).
    pub timestamp: DateTime<Utc>,
    /// Trade price.
    pub price: f64,
    /// Trade size.
    pub size: f64,
}

impl Tick {
    /// Creates a new tick.
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>, price: f64, size: f64) -> Self {
        Self {
            timestamp,
            price,
            size,
        }
    }
}

/// Top-of-book quote for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol being quoted.
    pub symbol: String,
    /// Quote time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Bid price.
    pub bid: f64,
    /// Ask (offer) price.
    pub ask: f64,
    /// Size available at the bid.
    pub bid_size: f64,
    /// Size available at the ask.
    pub ask_size: f64,
}

impl Quote {
    /// Creates a new quote.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        bid: f64,
        ask: f64,
        bid_size: f64,
        ask_size: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            bid,
            ask,
            bid_size,
            ask_size,
        }
    }

    /// Synthesizes a zero-spread quote from a bar's close.
    ///
    /// Used in backtests, where no quote feed exists.
    #[must_use]
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            bid: bar.close,
            ask: bar.close,
            bid_size: 0.0,
            ask_size: 0.0,
        }
    }

    /// Returns the mid price (average of bid and ask).
    #[must_use]
    pub fn mid(&self) -> f64 {
        (self.ask + self.bid) / 2.0
    }

    /// Returns the spread (ask - bid).
    #[must_use]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quote_mid_and_spread() {
        let quote = Quote::new("EURUSD", Utc::now(), 1.1000, 1.1002, 5.0, 7.0);
        assert!((quote.mid() - 1.1001).abs() < 1e-10);
        assert!((quote.spread() - 0.0002).abs() < 1e-10);
    }

    #[test]
    fn test_quote_from_bar() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let bar = Bar::new("MSFT", timestamp, 370.0, 371.0, 369.5, 370.5, 900.0);
        let quote = Quote::from_bar(&bar);

        assert_eq!(quote.symbol, "MSFT");
        assert_eq!(quote.timestamp, timestamp);
        assert!((quote.bid - 370.5).abs() < 1e-10);
        assert!(quote.spread().abs() < 1e-10);
    }
}
