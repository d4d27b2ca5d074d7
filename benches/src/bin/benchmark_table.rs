//! Benchmark runner that outputs a markdown table for the README.
//!
//! Run with: `cargo run --package cadence-bench --bin benchmark_table --release`

use cadence_bench::{BenchmarkResult, format_duration, format_rate, session_bars, time_run};
use cadence_lib::{AggregationRequest, BarAggregator, ExchangeCalendar, Interval};
use std::sync::Arc;

/// Number of iterations per benchmark for statistical significance.
const ITERATIONS: usize = 3;

/// Trading days of one-minute input.
const DAYS: u64 = 60;

fn main() {
    println!("cadence Aggregation Benchmark");
    println!("=============================\n");

    let aggregator = BarAggregator::with_calendar(Arc::new(ExchangeCalendar::us_equity()));
    let minutes = session_bars("AAPL", Interval::ONE_MINUTE, DAYS);
    println!("Input: {} one-minute bars over {DAYS} trading days\n", minutes.len());

    let mut rows = Vec::new();
    for target in ["5m", "15m", "1h", "1d", "1w"] {
        let Ok(interval) = target.parse::<Interval>() else {
            continue;
        };
        let request = AggregationRequest::new("AAPL", Interval::ONE_MINUTE, interval);
        let runs: Vec<BenchmarkResult> = (0..ITERATIONS)
            .map(|_| {
                time_run(&format!("1m -> {target}"), minutes.len() as u64, || {
                    aggregator
                        .aggregate(&minutes, &request)
                        .map_or(0, |bars| bars.len() as u64)
                })
            })
            .collect();
        rows.push((request.mode, average_results(&runs)));
    }

    println!("| Aggregation | Mode | Output Bars | Time | Throughput |");
    println!("|-------------|------|-------------|------|------------|");
    for (mode, result) in &rows {
        println!(
            "| {} | {mode} | {} | {} | {} |",
            result.operation,
            result.output_bars,
            format_duration(result.duration),
            format_rate(result.bars_per_sec())
        );
    }
}

fn average_results(results: &[BenchmarkResult]) -> BenchmarkResult {
    let mut average = results[0].clone();
    let total: std::time::Duration = results.iter().map(|r| r.duration).sum();
    average.duration = total / results.len() as u32;
    average
}
