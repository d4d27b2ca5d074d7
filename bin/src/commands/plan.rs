//! `cadence plan`.

use anyhow::{Context, Result};
use cadence_lib::{
    AvailabilityProbe, BarStore, DateRange, QuoteSource, SessionConfig, StreamDeterminer,
    TradingCalendar,
};
use std::path::Path;
use std::sync::Arc;

use crate::display::load_data_dir;

/// Prints the stream plan and historical source paths for every symbol.
pub(crate) fn plan(config_path: &Path, data: &Path) -> Result<()> {
    let config = SessionConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.validate().context("Invalid session configuration")?;

    let (store, loaded) = load_data_dir(data)?;
    tracing::info!(files = loaded.len(), "Loaded data directory");
    let store: Arc<dyn BarStore> = Arc::new(store);

    let calendar: Arc<dyn TradingCalendar> = Arc::new(config.calendar.clone());
    let range = config
        .dates
        .unwrap_or_else(|| DateRange::single_day(calendar.trading_date(chrono::Utc::now())));
    let probe = AvailabilityProbe::new(store).with_calendar(calendar);
    let determiner = StreamDeterminer::new();

    println!("Plan for {} session over {range}", config.mode);
    for symbol in &config.symbols {
        println!();
        println!("{}", symbol.symbol);

        let report = probe.probe(&symbol.symbol, range, &symbol.intervals)?;
        let stored: Vec<String> = report.stored().iter().map(ToString::to_string).collect();
        println!(
            "  Stored:      {}",
            if stored.is_empty() { "none".to_string() } else { stored.join(", ") }
        );

        match determiner.plan_stream(&symbol.intervals, &report, config.mode, symbol.quotes) {
            Ok(plan) => {
                println!("  Base:        {}", plan.base);
                let derived: Vec<String> = plan.derived.iter().map(ToString::to_string).collect();
                println!(
                    "  Derived:     {}",
                    if derived.is_empty() { "none".to_string() } else { derived.join(", ") }
                );
                let quotes = match plan.quotes {
                    QuoteSource::Streamed => "streamed",
                    QuoteSource::Synthesized => "synthesized from bars",
                    QuoteSource::None => "none",
                };
                println!("  Quotes:      {quotes}");
                for interval in &plan.unavailable {
                    println!("  Unavailable: {interval} (cannot be derived from {})", plan.base);
                }
            }
            Err(e) => println!("  Rejected:    {e}"),
        }

        for interval in &symbol.intervals {
            let historical = determiner.plan_historical(*interval, &report);
            if historical.candidates.is_empty() {
                println!("  History {interval}: no source");
                continue;
            }
            let paths: Vec<String> =
                historical.candidates.iter().map(ToString::to_string).collect();
            println!("  History {interval}: {}", paths.join(" | "));
        }
    }
    Ok(())
}
