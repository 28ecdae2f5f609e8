//! Hot-path benchmarks for the circuit breaker and metric store
//!
//! Run with: `cargo bench --bench resilience_bench -p farmgate-common
//! --features runtime`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use farmgate_common::metrics::{MetricStore, MetricStoreConfig};
use farmgate_common::resilience::{
    next_delay, BackoffConfig, CircuitBreaker, CircuitBreakerConfig, MockClock,
};

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("closed_before_after", |b| {
        let breaker = CircuitBreaker::with_defaults();
        b.iter(|| {
            if breaker.before_call(black_box("inventory")) {
                breaker.after_call("inventory", true);
            }
        });
    });

    group.bench_function("open_rejection", |b| {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig { failure_threshold: 1, timeout: Duration::from_secs(3600) };
        let breaker = match CircuitBreaker::with_clock(config, clock) {
            Ok(breaker) => breaker,
            Err(err) => panic!("benchmark breaker config rejected: {err}"),
        };
        breaker.before_call("payments");
        breaker.after_call("payments", false);

        b.iter(|| black_box(breaker.before_call(black_box("payments"))));
    });

    group.bench_function("permit_round_trip", |b| {
        let breaker = CircuitBreaker::with_defaults();
        b.iter(|| {
            if let Some(permit) = breaker.try_acquire(black_box("quotes")) {
                permit.succeed();
            }
        });
    });

    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let config = BackoffConfig::default();
    c.bench_function("backoff_next_delay", |b| {
        b.iter(|| {
            for attempt in 1..=10 {
                black_box(next_delay(black_box(attempt), &config));
            }
        });
    });
}

fn bench_metric_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("metric_store");

    group.bench_function("record", |b| {
        let store = MetricStore::with_defaults();
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            store.record(black_box("api.latency_ms"), value);
        });
    });

    for size in [100usize, 1_000, 10_000] {
        let config =
            MetricStoreConfig { retention: Duration::from_secs(3600), max_samples_per_series: size };
        let store = match MetricStore::new(config) {
            Ok(store) => store,
            Err(err) => panic!("benchmark store config rejected: {err}"),
        };
        for i in 0..size {
            store.record("latency", (i % 997) as f64);
        }

        group.bench_with_input(BenchmarkId::new("get_stats", size), &size, |b, _| {
            b.iter(|| black_box(store.get_stats("latency", None)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_circuit_breaker, bench_backoff, bench_metric_store);
criterion_main!(benches);
