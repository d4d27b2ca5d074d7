//! Session configuration.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cadence_calendar::ExchangeCalendar;
use cadence_determine::SessionMode;
use cadence_types::{CadenceError, DateRange, Interval};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config '{path}': {source}")]
    Read {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`SessionConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for CadenceError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Intervals requested for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// The symbol.
    pub symbol: String,
    /// Intervals to hold in the session, stored or derived.
    #[serde(default)]
    pub intervals: Vec<Interval>,
    /// Whether quotes are wanted.
    #[serde(default)]
    pub quotes: bool,
}

impl SymbolConfig {
    /// Creates a symbol request.
    #[must_use]
    pub fn new(symbol: impl Into<String>, intervals: Vec<Interval>) -> Self {
        Self {
            symbol: symbol.into(),
            intervals,
            quotes: false,
        }
    }

    /// Requests quotes.
    #[must_use]
    pub fn with_quotes(mut self) -> Self {
        self.quotes = true;
        self
    }
}

/// Lag-based activation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Lag above which the store is deactivated, in seconds.
    pub threshold_secs: u64,
    /// Lag is computed every this many drained bars.
    pub check_every: u32,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 60,
            check_every: 10,
        }
    }
}

impl LagConfig {
    /// Returns the lag threshold.
    #[must_use]
    pub fn threshold(&self) -> TimeDelta {
        TimeDelta::seconds(i64::try_from(self.threshold_secs).unwrap_or(i64::MAX))
    }
}

/// Consumer hand-off settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Capacity of each consumer's notification queue, in batches.
    pub queue_capacity: usize,
    /// How long to wait for a consumer's ready signal, in milliseconds.
    pub ready_timeout_ms: u64,
    /// Consecutive overruns after which a consumer is reported.
    pub escalate_after: u32,
    /// Bound on joining consumer threads at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            ready_timeout_ms: 1_000,
            escalate_after: 3,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ConsumerConfig {
    /// Returns the ready-signal timeout.
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Returns the shutdown join timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Everything a replay session needs, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backtest or live.
    pub mode: SessionMode,
    /// Trading dates to replay. Required for backtests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<DateRange>,
    /// Symbols and their requested intervals.
    pub symbols: Vec<SymbolConfig>,
    /// Trading days of history loaded before each session.
    pub history_days: u32,
    /// Lag protocol settings.
    pub lag: LagConfig,
    /// Consumer hand-off settings.
    pub consumers: ConsumerConfig,
    /// Sleep between live feed polls when no bar is pending, in milliseconds.
    pub poll_interval_ms: u64,
    /// Exchange calendar.
    pub calendar: ExchangeCalendar,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Backtest,
            dates: None,
            symbols: Vec::new(),
            history_days: 5,
            lag: LagConfig::default(),
            consumers: ConsumerConfig::default(),
            poll_interval_ms: 100,
            calendar: ExchangeCalendar::us_equity(),
        }
    }
}

impl SessionConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the JSON does not match.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the symbols requested more than once.
    ///
    /// Duplicates are not a configuration error: the first one is registered
    /// and each repeat is rejected on its own.
    #[must_use]
    pub fn duplicate_symbols(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.symbols
            .iter()
            .filter(|symbol| !seen.insert(symbol.symbol.as_str()))
            .map(|symbol| symbol.symbol.clone())
            .collect()
    }

    /// Checks the session-wide settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_string()));

        if self.mode == SessionMode::Backtest && self.dates.is_none() {
            return invalid("backtests need a date range");
        }
        if self.dates.is_some_and(|dates| dates.start > dates.end) {
            return invalid("date range ends before it starts");
        }
        if self.symbols.iter().any(|symbol| symbol.symbol.trim().is_empty()) {
            return invalid("symbol names cannot be empty");
        }
        if self.lag.check_every == 0 {
            return invalid("lag.check_every must be at least 1");
        }
        if self.consumers.queue_capacity == 0 {
            return invalid("consumers.queue_capacity must be at least 1");
        }
        if self.consumers.escalate_after == 0 {
            return invalid("consumers.escalate_after must be at least 1");
        }
        if self.calendar.open_time() >= self.calendar.close_time() {
            return invalid("calendar open must be before close");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "mode": "backtest",
        "dates": { "start": "2024-01-02", "end": "2024-01-05" },
        "symbols": [
            { "symbol": "AAPL", "intervals": ["1m", "5m", "1d"], "quotes": true },
            { "symbol": "MSFT", "intervals": ["15m"] }
        ],
        "lag": { "threshold_secs": 30 }
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = SessionConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.mode, SessionMode::Backtest);
        assert_eq!(
            config.dates.map(|dates| dates.start),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(config.symbols.len(), 2);
        assert!(config.symbols[0].quotes);
        assert!(!config.symbols[1].quotes);
        assert_eq!(config.symbols[1].intervals, vec!["15m".parse().unwrap()]);

        assert_eq!(config.lag.threshold_secs, 30);
        assert_eq!(config.lag.check_every, 10);
        assert_eq!(config.consumers, ConsumerConfig::default());
        assert_eq!(config.history_days, 5);
        assert_eq!(config.calendar, ExchangeCalendar::us_equity());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut config = SessionConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.mode = SessionMode::Live;
        config.validate().unwrap();

        config.lag.check_every = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_interval_is_a_parse_error() {
        let json = r#"{ "mode": "live", "symbols": [{ "symbol": "AAPL", "intervals": ["0m"] }] }"#;
        assert!(matches!(SessionConfig::from_json(json), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_duplicate_symbols() {
        let mut config = SessionConfig::from_json(CONFIG).unwrap();
        config.symbols.push(SymbolConfig::new("AAPL", Vec::new()));
        assert_eq!(config.duplicate_symbols(), vec!["AAPL".to_string()]);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.symbols[0].symbol, "AAPL");

        let missing = SessionConfig::from_file(Path::new("/nonexistent/cadence.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
