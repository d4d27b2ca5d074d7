//! Aggregation and gap detection benchmarks.
//!
//! Run with: `cargo bench --package cadence-bench`

use cadence_bench::{session_bars, with_holes};
use cadence_lib::{
    AggregationRequest, BarAggregator, ExchangeCalendar, GapEngine, Interval, StreamingAggregator,
    TradingCalendar,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

/// Trading days per data set.
const DAY_COUNTS: [u64; 2] = [5, 20];

fn iv(s: &str) -> Interval {
    s.parse().expect("valid interval")
}

fn calendar() -> Arc<dyn TradingCalendar> {
    Arc::new(ExchangeCalendar::us_equity())
}

fn batch_benchmark(c: &mut Criterion) {
    let aggregator = BarAggregator::with_calendar(calendar());
    let mut group = c.benchmark_group("aggregate");

    for days in DAY_COUNTS {
        let minutes = session_bars("AAPL", iv("1m"), days);
        group.throughput(Throughput::Elements(minutes.len() as u64));

        for target in ["5m", "1h", "1d"] {
            let request = AggregationRequest::new("AAPL", iv("1m"), iv(target));
            group.bench_with_input(
                BenchmarkId::new(format!("1m_to_{target}"), days),
                &minutes,
                |b, bars| b.iter(|| aggregator.aggregate(black_box(bars), &request)),
            );
        }
    }
    group.finish();
}

fn streaming_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming");

    for days in DAY_COUNTS {
        let minutes = session_bars("AAPL", iv("1m"), days);
        group.throughput(Throughput::Elements(minutes.len() as u64));
        group.bench_with_input(BenchmarkId::new("1m_to_5m", days), &minutes, |b, bars| {
            b.iter(|| {
                let request = AggregationRequest::new("AAPL", iv("1m"), iv("5m"));
                let mut streaming =
                    StreamingAggregator::new(BarAggregator::with_calendar(calendar()), request)
                        .expect("valid request");
                let mut events = 0;
                for bar in bars {
                    events += streaming.push(bar.clone()).expect("ordered input").len();
                }
                events += streaming.finish().expect("flush").len();
                black_box(events)
            });
        });
    }
    group.finish();
}

fn gap_benchmark(c: &mut Criterion) {
    let engine = GapEngine::new(calendar());
    let mut group = c.benchmark_group("gaps");

    for days in DAY_COUNTS {
        let minutes = with_holes(session_bars("AAPL", iv("1m"), days), 25);
        let (Some(first), Some(last)) = (minutes.first(), minutes.last()) else {
            continue;
        };
        let (start, end) = (first.timestamp, last.timestamp);
        group.throughput(Throughput::Elements(minutes.len() as u64));
        group.bench_with_input(BenchmarkId::new("assess_1m", days), &minutes, |b, bars| {
            b.iter(|| engine.assess(black_box(bars), iv("1m"), start, end));
        });
    }
    group.finish();
}

criterion_group!(benches, batch_benchmark, streaming_benchmark, gap_benchmark);
criterion_main!(benches);
