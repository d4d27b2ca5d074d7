//! Date range and day iteration.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::DateRangeError;

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive).
    pub start: NaiveDate,
    /// End date (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range, validating that start <= end.
    ///
    /// # Errors
    ///
    /// Returns an error if start > end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a date range for a single day.
    #[must_use]
    pub const fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Returns an iterator over every date in the range.
    #[must_use]
    pub const fn days(&self) -> DayIterator {
        DayIterator {
            current: Some(self.start),
            end: self.end,
        }
    }

    /// Returns the total number of days in the range.
    #[must_use]
    pub fn total_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Returns true if the range contains the given date.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Returns true if this range fully covers `other`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Returns the overlap of two ranges, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(Self { start, end })
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Iterator over all dates in a [`DateRange`].
#[derive(Debug, Clone)]
pub struct DayIterator {
    current: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for DayIterator {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.filter(|date| *date <= self.end)?;
        self.current = current.checked_add_days(Days::new(1));
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.current {
            Some(current) if current <= self.end => {
                let days = (self.end - current).num_days() as usize + 1;
                (days, Some(days))
            }
            _ => (0, Some(0)),
        }
    }
}

impl ExactSizeIterator for DayIterator {}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_new() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();

        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.end, date(2024, 1, 31));
        assert_eq!(range.total_days(), 31);
    }

    #[test]
    fn test_date_range_invalid() {
        assert!(DateRange::new(date(2024, 1, 31), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_day_iterator() {
        let range = DateRange::new(date(2024, 2, 27), date(2024, 3, 1)).unwrap();
        let days: Vec<_> = range.days().collect();

        assert_eq!(range.days().len(), 4);
        assert_eq!(days[0], date(2024, 2, 27));
        assert_eq!(days[2], date(2024, 2, 29));
        assert_eq!(days[3], date(2024, 3, 1));
    }

    #[test]
    fn test_covers_and_intersection() {
        let outer = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        let inner = DateRange::new(date(2024, 1, 10), date(2024, 1, 12)).unwrap();
        let later = DateRange::new(date(2024, 1, 20), date(2024, 2, 10)).unwrap();

        assert!(outer.covers(&inner));
        assert!(!outer.covers(&later));
        assert_eq!(
            outer.intersection(&later),
            Some(DateRange::new(date(2024, 1, 20), date(2024, 1, 31)).unwrap())
        );
        assert_eq!(inner.intersection(&later), None);
    }
}
