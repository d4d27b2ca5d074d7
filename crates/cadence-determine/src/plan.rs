//! Stream and historical load plans.

use std::fmt;

use cadence_types::Interval;
use serde::{Deserialize, Serialize};

/// Whether the session replays stored data or runs against a live feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Replay stored days under a virtual clock.
    #[default]
    Backtest,
    /// Replay the current day's backlog, then follow a live feed.
    Live,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backtest => write!(f, "backtest"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Where a symbol's quotes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    /// A separate live quote feed.
    Streamed,
    /// Built from the latest bar with zero spread.
    Synthesized,
    /// Quotes were not requested.
    None,
}

/// Current-day streaming plan for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamPlan {
    /// Symbol the plan is for.
    pub symbol: String,
    /// The single interval fetched or streamed.
    pub base: Interval,
    /// Intervals synthesized from the base, smallest first.
    pub derived: Vec<Interval>,
    /// Quote source.
    pub quotes: QuoteSource,
    /// Requested intervals that cannot be derived from the base.
    pub unavailable: Vec<Interval>,
}

impl StreamPlan {
    /// Returns every interval the session will hold, base first.
    #[must_use]
    pub fn intervals(&self) -> Vec<Interval> {
        std::iter::once(self.base)
            .chain(self.derived.iter().copied())
            .collect()
    }
}

/// The stages a historical load runs through.
///
/// The first stage is read from storage; every following stage aggregates
/// the previous one. A single stage is a direct load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourcePath {
    stages: Vec<Interval>,
}

impl SourcePath {
    /// A direct load of `interval`.
    #[must_use]
    pub fn direct(interval: Interval) -> Self {
        Self {
            stages: vec![interval],
        }
    }

    /// Builds the stage path from `source` to `target`.
    ///
    /// Intraday sources pass through `1d` before any multi-day or weekly
    /// target.
    #[must_use]
    pub fn between(source: Interval, target: Interval) -> Self {
        let mut stages = vec![source];
        if source.is_intraday() && target.is_calendar() && target != Interval::ONE_DAY {
            stages.push(Interval::ONE_DAY);
        }
        if target != source {
            stages.push(target);
        }
        Self { stages }
    }

    /// Returns the stages, storage read first.
    #[must_use]
    pub fn stages(&self) -> &[Interval] {
        &self.stages
    }

    /// Returns the interval read from storage.
    #[must_use]
    pub fn source(&self) -> Interval {
        self.stages[0]
    }

    /// Returns the interval produced.
    #[must_use]
    pub fn target(&self) -> Interval {
        self.stages[self.stages.len() - 1]
    }

    /// Returns true if the target is read from storage as is.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.stages.len() == 1
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

/// Candidate source paths for one historical interval, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalPlan {
    /// Symbol the plan is for.
    pub symbol: String,
    /// Interval to load.
    pub target: Interval,
    /// Direct load first when stored, then the fallback chain.
    pub candidates: Vec<SourcePath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(s: &str) -> Interval {
        s.parse().unwrap()
    }

    #[test]
    fn test_source_path_stages() {
        assert_eq!(SourcePath::between(iv("1s"), iv("5d")).to_string(), "1s -> 1d -> 5d");
        assert_eq!(SourcePath::between(iv("1m"), iv("1d")).to_string(), "1m -> 1d");
        assert_eq!(SourcePath::between(iv("1d"), iv("2w")).to_string(), "1d -> 2w");
        assert_eq!(SourcePath::between(iv("1s"), iv("15m")).to_string(), "1s -> 15m");

        let direct = SourcePath::direct(iv("1d"));
        assert!(direct.is_direct());
        assert_eq!(direct.source(), direct.target());
    }

    #[test]
    fn test_session_mode_serde() {
        assert_eq!(serde_json::to_string(&SessionMode::Live).unwrap(), "\"live\"");
        let mode: SessionMode = serde_json::from_str("\"backtest\"").unwrap();
        assert_eq!(mode, SessionMode::Backtest);
        assert_eq!(SessionMode::default(), SessionMode::Backtest);
    }
}
