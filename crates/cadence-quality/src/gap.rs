//! Gap records.

use cadence_types::Interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A run of missing bars.
///
/// `start` is the first missing slot and `end` the timestamp of the bar that
/// resumed the series (exclusive). Records are immutable: a successful fill
/// produces a new record via [`resolved`](Self::resolved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GapRecord {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    missing: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filled_from: Option<Interval>,
}

impl GapRecord {
    /// Creates an open gap.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>, missing: u64) -> Self {
        Self {
            start,
            end,
            missing,
            filled_from: None,
        }
    }

    /// Returns the record for this gap filled from `interval`.
    #[must_use]
    pub const fn resolved(&self, interval: Interval) -> Self {
        Self {
            filled_from: Some(interval),
            ..*self
        }
    }

    /// First missing slot.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Timestamp the series resumed at (exclusive).
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Number of missing bars.
    #[must_use]
    pub const fn missing(&self) -> u64 {
        self.missing
    }

    /// Interval the gap was filled from, if it was.
    #[must_use]
    pub const fn filled_from(&self) -> Option<Interval> {
        self.filled_from
    }

    /// Returns true if the gap has not been filled.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.filled_from.is_none()
    }
}

impl std::fmt::Display for GapRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} missing from {} to {}", self.missing, self.start, self.end)?;
        if let Some(interval) = self.filled_from {
            write!(f, " (filled from {interval})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolved_keeps_window() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 45, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 14, 46, 0).unwrap();
        let gap = GapRecord::new(start, end, 1);
        let filled = gap.resolved(Interval::ONE_SECOND);

        assert!(gap.is_open());
        assert!(!filled.is_open());
        assert_eq!(filled.start(), start);
        assert_eq!(filled.end(), end);
        assert_eq!(filled.filled_from(), Some(Interval::ONE_SECOND));
        assert!(filled.to_string().ends_with("(filled from 1s)"));
    }

    #[test]
    fn test_gap_serde() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 45, 0).unwrap();
        let gap = GapRecord::new(start, start, 3);
        let json = serde_json::to_string(&gap).unwrap();
        assert!(!json.contains("filled_from"));
        assert_eq!(serde_json::from_str::<GapRecord>(&json).unwrap(), gap);
    }
}
