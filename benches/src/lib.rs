//! Benchmark fixtures and timing utilities for cadence.

use cadence_lib::{Bar, DateRange, ExchangeCalendar, Interval, TradingCalendar};
use chrono::{NaiveDate, TimeDelta};
use std::time::{Duration, Instant};

/// First trading day of the synthetic data set.
pub const START_DATE: (i32, u32, u32) = (2024, 1, 2);

/// Result of a single timed run.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    /// Name of the operation.
    pub operation: String,
    /// Wall time of the run.
    pub duration: Duration,
    /// Source bars consumed.
    pub input_bars: u64,
    /// Bars produced.
    pub output_bars: u64,
}

impl BenchmarkResult {
    /// Source bars processed per second.
    pub fn bars_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 { self.input_bars as f64 / secs } else { 0.0 }
    }
}

/// Times `f`, which returns the number of bars it produced.
pub fn time_run(operation: &str, input_bars: u64, f: impl FnOnce() -> u64) -> BenchmarkResult {
    let start = Instant::now();
    let output_bars = f();
    BenchmarkResult {
        operation: operation.to_string(),
        duration: start.elapsed(),
        input_bars,
        output_bars,
    }
}

/// Returns the first `days` US equity trading days from [`START_DATE`].
pub fn trading_days(calendar: &ExchangeCalendar, days: u64) -> Vec<NaiveDate> {
    let (y, m, d) = START_DATE;
    let Some(start) = NaiveDate::from_ymd_opt(y, m, d) else {
        return Vec::new();
    };
    let end = start + TimeDelta::days(days as i64 * 2 + 7);
    let Ok(range) = DateRange::new(start, end) else {
        return Vec::new();
    };
    let mut dates = calendar.trading_days(range).unwrap_or_default();
    dates.truncate(days as usize);
    dates
}

/// Generates complete regular-hours bars of `interval` for `days` trading days.
///
/// Prices follow a deterministic zig-zag so every run sees the same input.
pub fn session_bars(symbol: &str, interval: Interval, days: u64) -> Vec<Bar> {
    let calendar = ExchangeCalendar::us_equity();
    let step = interval.duration();
    let mut bars = Vec::new();
    let mut price = 100.0_f64;

    for date in trading_days(&calendar, days) {
        let Ok(Some(bounds)) = calendar.session_bounds(date) else {
            continue;
        };
        let mut ts = bounds.open;
        while ts + step <= bounds.close {
            let i = bars.len() as f64;
            let delta = if (bars.len() / 7) % 2 == 0 { 0.05 } else { -0.04 };
            let open = price;
            let close = price + delta;
            bars.push(Bar::new(
                symbol,
                ts,
                open,
                open.max(close) + 0.02,
                open.min(close) - 0.02,
                close,
                1_000.0 + (i % 50.0) * 10.0,
            ));
            price = close;
            ts += step;
        }
    }
    bars
}

/// Removes every `nth` bar to simulate missing data.
pub fn with_holes(mut bars: Vec<Bar>, nth: usize) -> Vec<Bar> {
    if nth > 0 {
        let mut i = 0;
        bars.retain(|_| {
            i += 1;
            i % nth != 0
        });
    }
    bars
}

/// Format duration as human-readable string.
pub fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1_000 {
        format!("{micros}µs")
    } else if micros < 1_000_000 {
        format!("{:.2}ms", micros as f64 / 1_000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// Format a rate with a thousands suffix.
pub fn format_rate(per_sec: f64) -> String {
    if per_sec >= 1_000_000.0 {
        format!("{:.1}M/s", per_sec / 1_000_000.0)
    } else if per_sec >= 1_000.0 {
        format!("{:.1}K/s", per_sec / 1_000.0)
    } else {
        format!("{per_sec:.0}/s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_bars_cover_regular_hours() {
        let bars = session_bars("AAPL", Interval::ONE_MINUTE, 2);
        assert_eq!(bars.len(), 2 * 390);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_with_holes() {
        let bars = session_bars("AAPL", Interval::ONE_MINUTE, 1);
        assert_eq!(with_holes(bars, 10).len(), 390 - 39);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_micros(500)), "500µs");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
