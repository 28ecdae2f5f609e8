//! Bounded-concurrency batch execution
//!
//! Each item goes through three steps:
//!
//! 1. circuit check for the batch key; an open circuit fails the item with
//!    `CircuitOpen` without invoking the operation
//! 2. the retry executor, using the batch's backoff policy
//! 3. exactly one breaker outcome for the whole retried call
//!
//! At most `concurrency_limit` items are in flight. Items run on the calling
//! task through `buffer_unordered`, so the operation future need not be
//! `Send` or `'static`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use farmgate_common::metrics::MetricStore;
use farmgate_common::resilience::{
    BackoffConfig, CircuitBreaker, CircuitBreakerConfig, Clock, ConfigError, Jitter,
    ResilienceError, RetryAttemptOutcome, RetryExecutor, RetryOptions, SystemClock,
};
use farmgate_domain::{BatchProcessorConfig, FarmgateError, Result};
use futures::stream::{self, Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use super::metrics::ProcessingMetrics;
use super::outcome::{BatchReport, ItemOutcome};

/// Retry policy for items of a batch
pub fn retry_options(config: &BatchProcessorConfig) -> RetryOptions {
    RetryOptions {
        max_attempts: config.max_retries,
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            backoff_factor: config.backoff_factor,
        },
        jitter: if config.jitter { Jitter::Full } else { Jitter::None },
    }
}

/// Breaker policy for the key a batch runs under
pub fn circuit_breaker_config(config: &BatchProcessorConfig) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: config.circuit_breaker_threshold,
        timeout: Duration::from_millis(config.circuit_breaker_timeout_ms),
    }
}

fn config_error(err: ConfigError) -> FarmgateError {
    FarmgateError::Config(err.to_string())
}

/// Series and custom-metric names for one key
struct MetricNames {
    attempt_latency: String,
    attempt_success: String,
    item_latency: String,
    last_batch: String,
}

impl MetricNames {
    fn for_key(key: &str) -> Self {
        Self {
            attempt_latency: format!("{key}.attempt_latency_ms"),
            attempt_success: format!("{key}.attempt_success"),
            item_latency: format!("{key}.item_latency_ms"),
            last_batch: format!("{key}.last_batch"),
        }
    }
}

/// Runs batches of independent operations under retry and circuit breaking
///
/// The breaker and metric store are shared; many coordinators with different
/// configurations may use the same instances.
pub struct BatchCoordinator<C: Clock = SystemClock> {
    config: BatchProcessorConfig,
    executor: RetryExecutor,
    breaker_config: CircuitBreakerConfig,
    breaker: Arc<CircuitBreaker<C>>,
    metrics: Arc<MetricStore<C>>,
}

impl<C: Clock> std::fmt::Debug for BatchCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<C: Clock> BatchCoordinator<C> {
    /// Create a coordinator; invalid configuration fails here, never mid-batch
    ///
    /// # Errors
    /// Returns `FarmgateError::Config` if `config` fails validation or maps to
    /// an invalid retry or breaker policy.
    pub fn new(
        config: BatchProcessorConfig,
        metrics: Arc<MetricStore<C>>,
        breaker: Arc<CircuitBreaker<C>>,
    ) -> Result<Self> {
        config.validate()?;
        let executor = RetryExecutor::new(retry_options(&config)).map_err(config_error)?;
        let breaker_config = circuit_breaker_config(&config);
        breaker_config.validate().map_err(config_error)?;

        Ok(Self { config, executor, breaker_config, breaker, metrics })
    }

    /// Batch policy this coordinator applies
    pub fn config(&self) -> &BatchProcessorConfig {
        &self.config
    }

    /// Shared breaker consulted for every item
    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    /// Shared store receiving attempt, item and batch metrics
    pub fn metrics(&self) -> &Arc<MetricStore<C>> {
        &self.metrics
    }

    /// Process `items` and return results in input order with a summary
    ///
    /// A failing item never aborts the batch.
    #[instrument(
        skip_all,
        fields(key = %key, items = items.len(), batch_id = tracing::field::Empty)
    )]
    pub async fn process_batch<I, O, E, F, Fut>(
        &self,
        key: &str,
        items: &[I],
        operation: F,
    ) -> BatchReport<O, E>
    where
        F: Fn(&I) -> Fut,
        Fut: Future<Output = std::result::Result<O, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let batch_id = Uuid::now_v7();
        Span::current().record("batch_id", tracing::field::display(batch_id));
        info!(concurrency = self.config.concurrency_limit, "Starting batch");

        let mut outcomes: Vec<ItemOutcome<O, E>> =
            self.stream_batch(key, items, &operation).collect().await;
        outcomes.sort_by_key(|outcome| outcome.index);

        let metrics = ProcessingMetrics::from_outcomes(batch_id, &outcomes, Utc::now());
        self.publish_summary(key, &metrics);
        info!(
            total = metrics.total_processed,
            succeeded = metrics.success_count,
            failed = metrics.failure_count,
            success_rate = metrics.success_rate,
            "Batch complete"
        );

        let results = outcomes.into_iter().map(|outcome| outcome.result).collect();
        BatchReport { results, metrics }
    }

    /// Process `items` and yield each outcome as it completes
    ///
    /// Outcomes arrive in completion order; use [`ItemOutcome::index`] to map
    /// them back to inputs. Nothing runs until the stream is polled; the
    /// first poll applies this coordinator's breaker policy to `key`.
    pub fn stream_batch<'a, I, O, E, F, Fut>(
        &'a self,
        key: &'a str,
        items: &'a [I],
        operation: &'a F,
    ) -> impl Stream<Item = ItemOutcome<O, E>> + 'a
    where
        F: Fn(&I) -> Fut,
        Fut: Future<Output = std::result::Result<O, E>> + 'a,
        O: 'a,
        E: std::error::Error + Send + Sync + 'static,
    {
        let policy = self.breaker_config.clone();
        stream::once(async move {
            if let Err(err) = self.breaker.configure(key, policy) {
                warn!(key, error = %err, "Keeping existing circuit breaker policy");
            }
        })
        .flat_map(move |()| {
            stream::iter(items.iter().enumerate())
                .map(move |(index, item)| self.process_item(key, index, item, operation))
                .buffer_unordered(self.config.concurrency_limit)
        })
    }

    async fn process_item<I, O, E, F, Fut>(
        &self,
        key: &str,
        index: usize,
        item: &I,
        operation: &F,
    ) -> ItemOutcome<O, E>
    where
        F: Fn(&I) -> Fut,
        Fut: Future<Output = std::result::Result<O, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let names = MetricNames::for_key(key);
        let started = Instant::now();

        let Some(permit) = self.breaker.try_acquire(key) else {
            debug!(key, index, "Circuit open, skipping item");
            let latency = started.elapsed();
            self.metrics.record_duration(&names.item_latency, latency);
            return ItemOutcome {
                index,
                result: Err(ResilienceError::CircuitOpen { key: key.to_string() }),
                latency,
                attempts: 0,
            };
        };

        let outcome = self.executor.execute_with_outcome(key, || operation(item)).await;
        permit.complete(outcome.result.is_ok());

        self.record_attempts(&names, &outcome.attempts);
        let latency = started.elapsed();
        self.metrics.record_duration(&names.item_latency, latency);

        ItemOutcome { index, attempts: outcome.attempt_count(), result: outcome.result, latency }
    }

    fn record_attempts(&self, names: &MetricNames, attempts: &[RetryAttemptOutcome]) {
        for attempt in attempts {
            self.metrics.record_duration(&names.attempt_latency, attempt.elapsed);
            self.metrics
                .record(&names.attempt_success, if attempt.succeeded { 1.0 } else { 0.0 });
        }
    }

    fn publish_summary(&self, key: &str, metrics: &ProcessingMetrics) {
        let name = MetricNames::for_key(key).last_batch;
        match serde_json::to_value(metrics) {
            Ok(value) => self.metrics.set_custom_metric(&name, value),
            Err(err) => warn!(key, error = %err, "Failed to serialize batch summary"),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the batch coordinator
    //!
    //! Retry sleeps run on a paused tokio clock; breaker cooldowns use
    //! `MockClock`.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use farmgate_common::metrics::MetricStoreConfig;
    use farmgate_common::resilience::{CircuitState, MockClock};

    use super::*;
    use crate::batch::ErrorCategory;

    #[derive(Debug, Clone, thiserror::Error)]
    #[error("{0}")]
    struct ItemError(String);

    fn config(max_retries: u32, concurrency_limit: usize) -> BatchProcessorConfig {
        BatchProcessorConfig {
            max_retries,
            retry_delay_ms: 100,
            max_retry_delay_ms: 1_000,
            concurrency_limit,
            circuit_breaker_threshold: 100,
            circuit_breaker_timeout_ms: 60_000,
            ..Default::default()
        }
    }

    fn coordinator(config: BatchProcessorConfig) -> (BatchCoordinator<MockClock>, MockClock) {
        let clock = MockClock::new();
        let store = MetricStore::with_clock(MetricStoreConfig::default(), clock.clone())
            .expect("valid store");
        let breaker = CircuitBreaker::with_clock(CircuitBreakerConfig::default(), clock.clone())
            .expect("valid breaker");
        let coordinator = BatchCoordinator::new(config, Arc::new(store), Arc::new(breaker))
            .expect("valid coordinator");
        (coordinator, clock)
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let store = Arc::new(MetricStore::with_defaults());
        let breaker = Arc::new(CircuitBreaker::with_defaults());

        let zero_concurrency = BatchCoordinator::new(config(3, 0), store.clone(), breaker.clone());
        assert!(matches!(zero_concurrency, Err(FarmgateError::Config(_))));

        let zero_attempts = BatchCoordinator::new(config(0, 4), store, breaker);
        assert!(matches!(zero_attempts, Err(FarmgateError::Config(_))));
    }

    #[test]
    fn test_policy_mapping() {
        let config = BatchProcessorConfig { jitter: true, ..config(4, 2) };

        let retry = retry_options(&config);
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.backoff.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.jitter, Jitter::Full);

        let breaker = circuit_breaker_config(&config);
        assert_eq!(breaker.failure_threshold, 100);
        assert_eq!(breaker.timeout, Duration::from_secs(60));
    }

    /// Validates positional results with mixed outcomes.
    ///
    /// Assertions:
    /// - Items 2 and 4 (1-based) fail after exhausting retries.
    /// - Results keep input order and the success rate is 0.6.
    #[tokio::test(start_paused = true)]
    async fn test_mixed_batch_keeps_positions() {
        let (coordinator, _clock) = coordinator(config(2, 3));
        let items: Vec<u32> = (1..=5).collect();

        let report = coordinator
            .process_batch("listings", &items, |item: &u32| {
                let item = *item;
                async move {
                    if item % 2 == 0 {
                        Err(ItemError(format!("validation failed for {item}")))
                    } else {
                        Ok(item * 10)
                    }
                }
            })
            .await;

        assert_eq!(report.failed_indices(), vec![1, 3]);
        assert_eq!(report.successes().map(|(_, v)| *v).collect::<Vec<_>>(), vec![10, 30, 50]);
        assert!((report.metrics.success_rate - 0.6).abs() < 1e-9);
        assert_eq!(report.metrics.errors_in(ErrorCategory::Validation), 2);
        assert!(matches!(
            report.results[1],
            Err(ResilienceError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    /// Validates the concurrency bound.
    ///
    /// Assertions:
    /// - In-flight operations never exceed `concurrency_limit`.
    /// - The limit is actually reached.
    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let (coordinator, _clock) = coordinator(config(1, 3));
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u64> = (0..12).collect();

        let report = coordinator
            .process_batch("inventory", &items, |item: &u64| {
                let delay = Duration::from_millis(10 + item % 4);
                let in_flight = &in_flight;
                let peak = &peak;
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ItemError>(())
                }
            })
            .await;

        assert_eq!(report.metrics.success_count, 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (coordinator, _clock) = coordinator(config(3, 2));
        let calls = AtomicUsize::new(0);

        let report = coordinator
            .process_batch("quotes", &["a"], |_item: &&str| {
                let calls = &calls;
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ItemError("connection reset".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(report.metrics.success_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let store = coordinator.metrics();
        assert_eq!(store.values("quotes.attempt_success"), vec![0.0, 0.0, 1.0]);
        assert_eq!(store.get_stats("quotes.attempt_latency_ms", None).count, 3);
        assert_eq!(store.get_stats("quotes.item_latency_ms", None).count, 1);
    }

    /// Validates short-circuiting once the circuit opens.
    ///
    /// Assertions:
    /// - With concurrency 1 and threshold 2, the first two items fail and
    ///   open the circuit.
    /// - Remaining items fail with `CircuitOpen` and the operation is not
    ///   invoked for them.
    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_short_circuits_remaining_items() {
        let batch_config = BatchProcessorConfig { circuit_breaker_threshold: 2, ..config(1, 1) };
        let (coordinator, _clock) = coordinator(batch_config);
        let invoked = AtomicUsize::new(0);
        let items: Vec<u32> = (0..5).collect();

        let report = coordinator
            .process_batch("ai-pricing", &items, |_item: &u32| {
                let invoked = &invoked;
                async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ItemError("upstream unavailable".into()))
                }
            })
            .await;

        assert_eq!(invoked.load(Ordering::SeqCst), 2);
        assert_eq!(report.metrics.total_processed, 5);
        assert_eq!(report.metrics.errors_in(ErrorCategory::CircuitOpen), 3);
        assert_eq!(report.metrics.errors_in(ErrorCategory::Unknown), 2);
        assert!(report.results[4].as_ref().is_err_and(ResilienceError::is_circuit_open));
        assert_eq!(coordinator.breaker().state("ai-pricing"), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_recovers_after_timeout() {
        let batch_config = BatchProcessorConfig { circuit_breaker_threshold: 1, ..config(1, 1) };
        let (coordinator, clock) = coordinator(batch_config);

        let failed = coordinator
            .process_batch("sms", &[1u32], |_: &u32| async {
                Err::<(), _>(ItemError("network down".into()))
            })
            .await;
        assert_eq!(failed.metrics.errors_in(ErrorCategory::Network), 1);

        clock.advance(Duration::from_secs(60));
        let recovered = coordinator
            .process_batch("sms", &[1u32, 2], |_: &u32| async { Ok::<_, ItemError>(()) })
            .await;

        assert_eq!(recovered.metrics.success_count, 2);
        assert_eq!(coordinator.breaker().state("sms"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_every_item() {
        let (coordinator, _clock) = coordinator(config(1, 4));
        let items: Vec<u64> = vec![40, 10, 30, 20];
        let operation = |delay: &u64| {
            let delay = *delay;
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, ItemError>(delay)
            }
        };

        let outcomes: Vec<_> = coordinator.stream_batch("feed", &items, &operation).collect().await;

        let order: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
        assert!(outcomes.iter().all(|o| o.is_success() && o.attempts == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_last_batch_summary() {
        let (coordinator, _clock) = coordinator(config(1, 2));

        let report = coordinator
            .process_batch("orders", &[1u32, 2, 3], |_: &u32| async { Ok::<_, ItemError>(()) })
            .await;

        let summary =
            coordinator.metrics().get_custom_metric("orders.last_batch").expect("summary stored");
        assert_eq!(summary["total_processed"], 3);
        assert_eq!(summary["batch_id"], report.metrics.batch_id.to_string());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (coordinator, _clock) = coordinator(config(1, 2));
        let items: Vec<u32> = Vec::new();

        let report =
            coordinator.process_batch("empty", &items, |_: &u32| async { Ok::<_, ItemError>(()) }).await;

        assert!(report.results.is_empty());
        assert_eq!(report.metrics.total_processed, 0);
        assert_eq!(report.metrics.success_rate, 0.0);
    }

    /// Validates that building a stream has no side effects.
    ///
    /// Assertions:
    /// - An unpolled stream leaves the shared breaker untouched.
    /// - The first poll applies the coordinator's policy to the key.
    #[tokio::test(start_paused = true)]
    async fn test_stream_applies_breaker_policy_on_first_poll() {
        let batch_config = BatchProcessorConfig { circuit_breaker_threshold: 7, ..config(1, 2) };
        let (coordinator, _clock) = coordinator(batch_config);
        let operation = |_: &u32| async { Ok::<_, ItemError>(()) };
        let items = [1u32, 2];

        let unpolled = coordinator.stream_batch("catalog", &items, &operation);
        drop(unpolled);
        assert!(coordinator.breaker().snapshot("catalog").is_none());

        let outcomes: Vec<_> =
            coordinator.stream_batch("catalog", &items, &operation).collect().await;
        assert_eq!(outcomes.len(), 2);
        let snapshot = coordinator.breaker().snapshot("catalog").expect("key configured");
        assert_eq!(snapshot.failure_threshold, 7);
    }
}
