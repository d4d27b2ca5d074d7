//! OHLCV bar data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Interval;

/// OHLCV bar for a single symbol and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol the bar belongs to.
    pub symbol: String,
    /// Bar open time (start of the period, UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Total traded volume.
    pub volume: f64,
    /// Number of trades in the bar, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_count: Option<u32>,
    /// Interval the bar was rebuilt from when it filled a gap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_from: Option<Interval>,
}

impl Bar {
    /// Creates a new bar.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            trade_count: None,
            filled_from: None,
        }
    }

    /// Sets the trade count.
    #[must_use]
    pub fn with_trade_count(mut self, trade_count: u32) -> Self {
        self.trade_count = Some(trade_count);
        self
    }

    /// Marks the bar as produced by a gap fill from `interval`.
    #[must_use]
    pub fn with_filled_from(mut self, interval: Interval) -> Self {
        self.filled_from = Some(interval);
        self
    }

    /// Checks the OHLCV invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if a price is not finite, the high/low do not bound
    /// the open and close, or the volume is negative.
    pub fn validate(&self) -> Result<(), BarError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(BarError::NonFinite { field, value });
            }
        }
        if self.high < self.open.max(self.close) {
            return Err(BarError::HighBelowBody {
                high: self.high,
                body_high: self.open.max(self.close),
            });
        }
        if self.low > self.open.min(self.close) {
            return Err(BarError::LowAboveBody {
                low: self.low,
                body_low: self.open.min(self.close),
            });
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume(self.volume));
        }
        Ok(())
    }

    /// Returns the price range (high - low).
    #[must_use]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Returns true if this is a bullish (green) bar.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Returns the typical price ((high + low + close) / 3).
    #[must_use]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// A violated OHLCV invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BarError {
    /// A price or the volume is NaN or infinite.
    #[error("{field} is not finite: {value}")]
    NonFinite {
        /// Name of the offending field.
        field: &'static str,
        /// The offending value.
        value: f64,
    },

    /// The high is below the open or close.
    #[error("high {high} is below max(open, close) {body_high}")]
    HighBelowBody {
        /// The bar high.
        high: f64,
        /// `max(open, close)`.
        body_high: f64,
    },

    /// The low is above the open or close.
    #[error("low {low} is above min(open, close) {body_low}")]
    LowAboveBody {
        /// The bar low.
        low: f64,
        /// `min(open, close)`.
        body_low: f64,
    },

    /// The volume is negative.
    #[error("volume is negative: {0}")]
    NegativeVolume(f64),
}
