//! Bar interval definitions.

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::str::FromStr;
use thiserror::Error;

/// Unit of a bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Trading days.
    Day,
    /// Trading weeks.
    Week,
}

impl IntervalUnit {
    /// Returns the nominal length of one unit in seconds.
    #[must_use]
    pub const fn seconds(&self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Day => 86_400,
            Self::Week => 604_800,
        }
    }

    /// Returns the suffix used in interval strings.
    #[must_use]
    pub const fn suffix(&self) -> char {
        match self {
            Self::Second => 's',
            Self::Minute => 'm',
            Self::Day => 'd',
            Self::Week => 'w',
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Second => 0,
            Self::Minute => 1,
            Self::Day => 2,
            Self::Week => 3,
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Day => "day",
            Self::Week => "week",
        };
        write!(f, "{name}")
    }
}

/// A bar resolution such as `1s`, `5m`, `1d` or `2w`.
///
/// Intervals are kept in canonical form: second multiples of a whole minute
/// become minutes (`120s` is `2m`) and hours are expressed in minutes (`1h`
/// is `60m`). Equality compares the canonical form, ordering compares the
/// canonical duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    unit: IntervalUnit,
    multiplier: u32,
    canonical_seconds: u64,
}

impl Interval {
    /// One-second bars.
    pub const ONE_SECOND: Self = Self::from_parts(IntervalUnit::Second, 1);
    /// One-minute bars.
    pub const ONE_MINUTE: Self = Self::from_parts(IntervalUnit::Minute, 1);
    /// Daily bars.
    pub const ONE_DAY: Self = Self::from_parts(IntervalUnit::Day, 1);
    /// Weekly bars.
    pub const ONE_WEEK: Self = Self::from_parts(IntervalUnit::Week, 1);

    /// Intervals that storage can hold as a base series, smallest first.
    pub const STORAGE_BASES: [Self; 3] = [Self::ONE_SECOND, Self::ONE_MINUTE, Self::ONE_DAY];

    const fn from_parts(unit: IntervalUnit, multiplier: u32) -> Self {
        Self {
            unit,
            multiplier,
            canonical_seconds: unit.seconds() * multiplier as u64,
        }
    }

    /// Creates an interval, normalizing it to canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if `multiplier` is zero.
    pub fn new(unit: IntervalUnit, multiplier: u32) -> Result<Self, IntervalParseError> {
        if multiplier == 0 {
            return Err(IntervalParseError::ZeroMultiplier(format!(
                "{multiplier}{}",
                unit.suffix()
            )));
        }
        if unit == IntervalUnit::Second && multiplier % 60 == 0 {
            return Ok(Self::from_parts(IntervalUnit::Minute, multiplier / 60));
        }
        Ok(Self::from_parts(unit, multiplier))
    }

    /// Creates an interval of `n` seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero.
    pub fn seconds(n: u32) -> Result<Self, IntervalParseError> {
        Self::new(IntervalUnit::Second, n)
    }

    /// Creates an interval of `n` minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero.
    pub fn minutes(n: u32) -> Result<Self, IntervalParseError> {
        Self::new(IntervalUnit::Minute, n)
    }

    /// Creates an interval of `n` trading days.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero.
    pub fn days(n: u32) -> Result<Self, IntervalParseError> {
        Self::new(IntervalUnit::Day, n)
    }

    /// Creates an interval of `n` trading weeks.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero.
    pub fn weeks(n: u32) -> Result<Self, IntervalParseError> {
        Self::new(IntervalUnit::Week, n)
    }

    /// Returns the interval unit.
    #[must_use]
    pub const fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// Returns the unit multiplier.
    #[must_use]
    pub const fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Returns the canonical duration in seconds.
    #[must_use]
    pub const fn canonical_seconds(&self) -> u64 {
        self.canonical_seconds
    }

    /// Returns the canonical duration.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.canonical_seconds as i64)
    }

    /// Returns true for second and minute intervals.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        matches!(self.unit, IntervalUnit::Second | IntervalUnit::Minute)
    }

    /// Returns true for day and week intervals, which follow the trading calendar.
    #[must_use]
    pub const fn is_calendar(&self) -> bool {
        matches!(self.unit, IntervalUnit::Day | IntervalUnit::Week)
    }

    /// Returns the single-unit interval of the same unit (`5m` gives `1m`).
    #[must_use]
    pub const fn unit_base(&self) -> Self {
        Self::from_parts(self.unit, 1)
    }

    /// Returns true if this interval is a whole multiple of `other`.
    #[must_use]
    pub const fn is_multiple_of(&self, other: &Self) -> bool {
        self.canonical_seconds >= other.canonical_seconds
            && self.canonical_seconds % other.canonical_seconds == 0
    }

    /// Returns how many `source` bars make up one bar of this interval.
    ///
    /// Returns `None` if this interval is not a whole multiple of `source`.
    #[must_use]
    pub const fn ratio_to(&self, source: &Self) -> Option<u64> {
        if self.is_multiple_of(source) {
            Some(self.canonical_seconds / source.canonical_seconds)
        } else {
            None
        }
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical_seconds
            .cmp(&other.canonical_seconds)
            .then_with(|| self.unit.rank().cmp(&other.unit.rank()))
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.multiplier, self.unit.suffix())
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let Some(suffix) = normalized.chars().last() else {
            return Err(IntervalParseError::Empty);
        };
        let digits = &normalized[..normalized.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(IntervalParseError::InvalidMultiplier(s.to_string()));
        }
        let multiplier: u32 = digits
            .parse()
            .map_err(|_| IntervalParseError::InvalidMultiplier(s.to_string()))?;
        if multiplier == 0 {
            return Err(IntervalParseError::ZeroMultiplier(s.to_string()));
        }

        match suffix {
            's' => Self::new(IntervalUnit::Second, multiplier),
            'm' => Self::new(IntervalUnit::Minute, multiplier),
            'h' => multiplier
                .checked_mul(60)
                .ok_or_else(|| IntervalParseError::InvalidMultiplier(s.to_string()))
                .and_then(|minutes| Self::new(IntervalUnit::Minute, minutes)),
            'd' => Self::new(IntervalUnit::Day, multiplier),
            'w' => Self::new(IntervalUnit::Week, multiplier),
            _ => Err(IntervalParseError::UnknownUnit(s.to_string())),
        }
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error returned when parsing an invalid interval string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalParseError {
    /// The interval string was empty.
    #[error("empty interval string")]
    Empty,

    /// The numeric prefix was missing or not a number.
    #[error("invalid interval '{0}', expected <count><unit> such as 1s, 5m, 1d, 2w")]
    InvalidMultiplier(String),

    /// The multiplier was zero.
    #[error("invalid interval '{0}', multiplier must be at least 1")]
    ZeroMultiplier(String),

    /// The unit suffix was not recognized.
    #[error("invalid interval '{0}', unit must be one of s, m, h, d, w")]
    UnknownUnit(String),
}
