//! Integration tests for the metric store
//!
//! Covers retention, windowed statistics and custom metrics through the
//! public API with a shared `MockClock`.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use farmgate_common::metrics::{percentile, MetricStats, MetricStore, MetricStoreConfig};
use farmgate_common::resilience::MockClock;
use serde_json::json;

fn store_with_retention(retention: Duration) -> (MetricStore<MockClock>, MockClock) {
    let clock = MockClock::new();
    let config = MetricStoreConfig { retention, max_samples_per_series: 1_000 };
    (MetricStore::with_clock(config, clock.clone()).expect("valid config"), clock)
}

/// Validates that `get_all_metrics` shows exactly the retained subset.
///
/// # Test Steps
/// 1. Record 10 values one second apart with a 5 second retention
/// 2. Verify only values recorded within the last 5 seconds remain, in order
#[test]
fn test_all_metrics_returns_retained_subset_in_order() {
    let (store, clock) = store_with_retention(Duration::from_secs(5));

    for value in 0..10u32 {
        store.record("listings.views", f64::from(value));
        clock.advance(Duration::from_secs(1));
    }
    // Last record happened at t=9; reads happen at t=10 with cutoff t=5
    let all = store.get_all_metrics();

    assert_eq!(all["listings.views"], vec![5.0, 6.0, 7.0, 8.0, 9.0]);
}

#[test]
fn test_stats_match_percentile_helper() {
    let (store, _clock) = store_with_retention(Duration::from_secs(3600));
    let latencies = [12.0, 480.0, 33.0, 51.0, 19.0, 27.0, 95.0, 44.0, 61.0, 28.0];
    for latency in latencies {
        store.record("http.latency_ms", latency);
    }

    let stats = store.get_stats("http.latency_ms", None);

    assert_eq!(stats.count, latencies.len());
    assert_eq!(stats.min, 12.0);
    assert_eq!(stats.max, 480.0);
    assert_eq!(stats.p95, percentile(&latencies, 95.0));
    assert_eq!(stats.p99, 480.0);
}

#[test]
fn test_window_narrower_than_retention() {
    let (store, clock) = store_with_retention(Duration::from_secs(600));

    store.record("orders.created", 1.0);
    clock.advance(Duration::from_secs(300));
    store.record("orders.created", 1.0);
    store.record("orders.created", 1.0);

    assert_eq!(store.get_stats("orders.created", Some(Duration::from_secs(60))).count, 2);
    assert_eq!(store.get_stats("orders.created", Some(Duration::from_secs(3600))).count, 3);
}

#[test]
fn test_custom_metrics_survive_series_eviction() {
    let (store, clock) = store_with_retention(Duration::from_secs(1));

    store.set_custom_metric("market.open", json!(true));
    store.record("temp", 20.0);
    clock.advance(Duration::from_secs(2));
    store.evict_expired();

    assert!(store.series_names().is_empty());
    assert_eq!(store.get_custom_metric("market.open"), Some(json!(true)));

    store.clear_metrics();
    assert_eq!(store.get_custom_metric("market.open"), None);
    assert_eq!(store.get_stats("temp", None), MetricStats::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shared_store_across_tasks() {
    let store = Arc::new(MetricStore::with_defaults());
    let mut handles = vec![];

    for task in 0..10u32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..50u32 {
                store.record(&format!("worker.{}", task % 2), f64::from(i));
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task should complete");
    }

    assert_eq!(store.series_names(), vec!["worker.0".to_string(), "worker.1".to_string()]);
    assert_eq!(store.get_stats("worker.0", None).count, 250);
    assert_eq!(store.summary()["worker.1"].max, 49.0);
}
