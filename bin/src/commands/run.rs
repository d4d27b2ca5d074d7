//! `cadence run`.

use anyhow::{Context, Result, bail};
use cadence_lib::{BarStore, ExportMode, ReplayCoordinator, SessionConfig, SessionMode};
use std::path::Path;
use std::sync::Arc;

use crate::display::{SnapshotMode, day_progress, load_data_dir, write_json};

/// Replays a backtest and optionally writes the final session snapshot.
pub(crate) fn run(
    config_path: &Path,
    data: &Path,
    export: Option<&Path>,
    mode: SnapshotMode,
    quiet: bool,
) -> Result<()> {
    let config = SessionConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if config.mode != SessionMode::Backtest {
        bail!("`cadence run` replays backtests; {} sessions need a live feed", config.mode);
    }

    let (store, loaded) = load_data_dir(data)?;
    if loaded.is_empty() {
        bail!("No bar files found in {}", data.display());
    }
    let store: Arc<dyn BarStore> = Arc::new(store);

    let mut coordinator = ReplayCoordinator::new(config, store);
    let days = coordinator.session_days()?;
    let pb = day_progress(days.len() as u64, quiet)?;

    let mut rejected = Vec::new();
    let stats = coordinator.run_with(|date, report| {
        pb.set_message(date.to_string());
        pb.inc(1);
        for (symbol, reason) in &report.rejected {
            rejected.push(format!("{date} {symbol}: {reason}"));
        }
        for (symbol, interval) in &report.history_missing {
            tracing::warn!(%date, symbol = %symbol, %interval, "No history loaded");
        }
    })?;
    pb.finish_and_clear();

    if !quiet {
        println!("Replayed {} trading days", stats.trading_days);
        println!("  Bars drained:        {}", stats.drained_bars);
        println!("  Out-of-hours drops:  {}", stats.out_of_hours_drops);
        println!("  Gaps filled:         {}", stats.filled_gaps);
        println!("  Notifications:       {}", stats.notifications);
        println!(
            "  Lag transitions:     {} deactivations, {} activations",
            stats.deactivations, stats.activations
        );
        if stats.backpressure_events > 0 {
            println!("  Backpressure events: {}", stats.backpressure_events);
        }
        for (consumer, overruns) in &stats.overruns {
            println!("  Overruns ({consumer}): {overruns}");
        }
        for line in &rejected {
            println!("  Rejected {line}");
        }
    }

    if let Some(path) = export {
        let snapshot = coordinator.store().export(ExportMode::from(mode));
        write_json(&snapshot, Some(path))?;
        if !quiet {
            println!("Snapshot written to {}", path.display());
        }
    }
    Ok(())
}
