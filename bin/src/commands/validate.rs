//! `cadence validate`.

use anyhow::{Context, Result};
use cadence_lib::SessionConfig;
use std::path::Path;

/// Loads and checks a session configuration, then prints a summary.
pub(crate) fn validate(path: &Path) -> Result<()> {
    let config = SessionConfig::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config.validate().context("Invalid session configuration")?;

    println!("Configuration OK: {}", path.display());
    println!("  Mode:         {}", config.mode);
    if let Some(dates) = config.dates {
        println!("  Dates:        {dates}");
    }
    println!("  History days: {}", config.history_days);
    println!("  Timezone:     {}", config.calendar.timezone());
    println!("  Symbols:      {}", config.symbols.len());
    for symbol in &config.symbols {
        let intervals: Vec<String> = symbol.intervals.iter().map(ToString::to_string).collect();
        let quotes = if symbol.quotes { " + quotes" } else { "" };
        println!("    {:<8} {}{quotes}", symbol.symbol, intervals.join(", "));
    }

    for duplicate in config.duplicate_symbols() {
        println!("  Warning: {duplicate} is listed more than once; repeats will be rejected");
    }
    Ok(())
}
