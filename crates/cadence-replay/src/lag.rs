//! Lag-based activation.

use chrono::{DateTime, TimeDelta, Utc};

use crate::LagConfig;

/// Decides, every `check_every` drained bars, whether the session store
/// should serve external readers.
///
/// While the drained bar trails the clock by more than the threshold the
/// session is catching up and the store is deactivated.
#[derive(Debug, Clone)]
pub struct LagMonitor {
    check_every: u64,
    threshold: TimeDelta,
    drained: u64,
}

impl LagMonitor {
    /// Creates a monitor from the lag settings.
    #[must_use]
    pub fn new(config: &LagConfig) -> Self {
        Self {
            check_every: u64::from(config.check_every.max(1)),
            threshold: config.threshold(),
            drained: 0,
        }
    }

    /// Counts one drained bar.
    ///
    /// At every checkpoint returns whether the store should be active.
    pub fn observe(&mut self, clock: DateTime<Utc>, bar: DateTime<Utc>) -> Option<bool> {
        self.drained += 1;
        if self.drained % self.check_every != 0 {
            return None;
        }
        Some(clock - bar <= self.threshold)
    }

    /// Returns the number of bars counted.
    #[must_use]
    pub const fn drained(&self) -> u64 {
        self.drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_checks_every_k_bars() {
        let mut monitor = LagMonitor::new(&LagConfig {
            threshold_secs: 60,
            check_every: 3,
        });
        let clock = Utc.with_ymd_and_hms(2024, 1, 2, 16, 30, 0).unwrap();
        let behind = clock - TimeDelta::hours(2);

        assert_eq!(monitor.observe(clock, behind), None);
        assert_eq!(monitor.observe(clock, behind), None);
        assert_eq!(monitor.observe(clock, behind), Some(false));
        monitor.observe(clock, clock);
        monitor.observe(clock, clock);
        // Exactly at the threshold counts as caught up
        assert_eq!(monitor.observe(clock, clock - TimeDelta::seconds(60)), Some(true));
        assert_eq!(monitor.drained(), 6);
    }
}
