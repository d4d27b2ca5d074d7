//! `cadence aggregate`.

use anyhow::{Context, Result};
use cadence_lib::{
    AggregationRequest, AlwaysOpenCalendar, Bar, BarAggregator, ExchangeCalendar, GapEngine,
    Interval, JsonStyle, TradingCalendar, read_bars, write_bars,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Aggregates a bar file and reports the completeness of its input.
pub(crate) fn aggregate(
    input: &Path,
    source: &str,
    target: &str,
    output: Option<&Path>,
    us_equity: bool,
) -> Result<()> {
    let source: Interval = source
        .parse()
        .with_context(|| format!("Invalid source interval: {source}"))?;
    let target: Interval = target
        .parse()
        .with_context(|| format!("Invalid target interval: {target}"))?;

    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let bars = read_bars(BufReader::new(file), JsonStyle::from_path(input))
        .with_context(|| format!("Failed to parse {}", input.display()))?;

    let calendar: Arc<dyn TradingCalendar> = if us_equity {
        Arc::new(ExchangeCalendar::us_equity())
    } else {
        Arc::new(AlwaysOpenCalendar)
    };
    let aggregator = BarAggregator::with_calendar(Arc::clone(&calendar));
    let engine = GapEngine::new(calendar);

    let mut by_symbol: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
    }

    let mut aggregated = Vec::new();
    for (symbol, mut bars) in by_symbol {
        bars.sort_by_key(|bar| bar.timestamp);
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            continue;
        };

        let report = engine.assess(&bars, source, first.timestamp, last.timestamp)?;
        eprintln!(
            "{symbol}: {} {source} bars, {:.1}% complete, {} gaps",
            report.actual,
            report.quality,
            report.gaps.len()
        );

        let request = AggregationRequest::new(symbol.as_str(), source, target);
        let result = aggregator.aggregate(&bars, &request)?;
        eprintln!("{symbol}: {} {target} bars ({})", result.len(), request.mode);
        aggregated.extend(result);
    }

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_bars(&aggregated, &mut writer, JsonStyle::from_path(path), true)?;
            writer.flush()?;
        }
        None => write_bars(&aggregated, std::io::stdout().lock(), JsonStyle::Ndjson, false)?,
    }
    Ok(())
}
