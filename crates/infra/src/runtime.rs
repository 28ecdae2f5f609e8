//! Process-wide resilience objects
//!
//! [`ResilienceRuntime`] owns the single [`MetricStore`] and
//! [`CircuitBreaker`] of a process and hands out coordinators and executors
//! that share them. Build it once at startup and pass it (or clones of its
//! `Arc`s) to whatever needs them.

use std::sync::Arc;
use std::time::Duration;

use farmgate_common::metrics::{MetricStore, MetricStoreConfig};
use farmgate_common::resilience::{
    BackoffConfig, CircuitBreaker, Clock, ConfigError, Jitter, RetryExecutor, RetryOptions,
    SystemClock,
};
use farmgate_core::batch::{circuit_breaker_config, BatchCoordinator};
use farmgate_domain::{
    BatchProcessorConfig, Config, FarmgateError, MetricsSettings, Result, RetrySettings,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

fn config_error(err: ConfigError) -> FarmgateError {
    FarmgateError::Config(err.to_string())
}

/// Metric store limits from settings
pub fn metric_store_config(settings: &MetricsSettings) -> MetricStoreConfig {
    MetricStoreConfig {
        retention: Duration::from_secs(settings.retention_secs),
        max_samples_per_series: settings.max_samples_per_series,
    }
}

/// Retry policy for executors used outside of batches
pub fn standalone_retry_options(settings: &RetrySettings) -> RetryOptions {
    RetryOptions {
        max_attempts: settings.max_attempts,
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_factor: settings.backoff_factor,
        },
        jitter: if settings.jitter { Jitter::Full } else { Jitter::None },
    }
}

/// Shared metric store and circuit breaker plus the config they came from
#[derive(Debug)]
pub struct ResilienceRuntime<C: Clock = SystemClock> {
    config: Config,
    metrics: Arc<MetricStore<C>>,
    breaker: Arc<CircuitBreaker<C>>,
}

impl<C: Clock> Clone for ResilienceRuntime<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            metrics: Arc::clone(&self.metrics),
            breaker: Arc::clone(&self.breaker),
        }
    }
}

impl ResilienceRuntime<SystemClock> {
    /// Build the runtime objects from a validated configuration
    ///
    /// # Errors
    /// Returns `FarmgateError::Config` if `config` fails validation.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Load configuration from the standard sources and build the runtime
    ///
    /// # Errors
    /// Propagates loader errors and validation failures.
    pub fn load() -> Result<Self> {
        Self::from_config(&crate::config::load()?)
    }
}

impl<C: Clock + Clone> ResilienceRuntime<C> {
    /// Build the runtime with breaker and store driven by `clock`
    ///
    /// # Errors
    /// Returns `FarmgateError::Config` if `config` fails validation.
    pub fn with_clock(config: &Config, clock: C) -> Result<Self> {
        config.validate()?;

        let metrics = MetricStore::with_clock(metric_store_config(&config.metrics), clock.clone())
            .map_err(config_error)?;
        let breaker = CircuitBreaker::with_clock(circuit_breaker_config(&config.batch), clock)
            .map_err(config_error)?;

        info!(
            retention_secs = config.metrics.retention_secs,
            breaker_threshold = config.batch.circuit_breaker_threshold,
            "Resilience runtime ready"
        );

        Ok(Self { config: config.clone(), metrics: Arc::new(metrics), breaker: Arc::new(breaker) })
    }
}

impl<C: Clock> ResilienceRuntime<C> {
    /// Configuration the runtime was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle to the shared metric store
    pub fn metrics(&self) -> Arc<MetricStore<C>> {
        Arc::clone(&self.metrics)
    }

    /// Handle to the shared circuit breaker
    pub fn breaker(&self) -> Arc<CircuitBreaker<C>> {
        Arc::clone(&self.breaker)
    }

    /// Coordinator using the configured batch policy
    ///
    /// # Errors
    /// Returns `FarmgateError::Config` if the batch policy is invalid.
    pub fn batch_coordinator(&self) -> Result<BatchCoordinator<C>> {
        self.batch_coordinator_with(self.config.batch.clone())
    }

    /// Coordinator with its own batch policy, sharing this runtime's state
    ///
    /// # Errors
    /// Returns `FarmgateError::Config` if `config` is invalid.
    pub fn batch_coordinator_with(
        &self,
        config: BatchProcessorConfig,
    ) -> Result<BatchCoordinator<C>> {
        BatchCoordinator::new(config, self.metrics(), self.breaker())
    }

    /// Retry executor using the configured retry policy
    ///
    /// # Errors
    /// Returns `FarmgateError::Config` if the retry settings are invalid.
    pub fn retry_executor(&self) -> Result<RetryExecutor> {
        RetryExecutor::new(standalone_retry_options(&self.config.retry)).map_err(config_error)
    }

    /// Sweep expired metric samples every `period` on the current tokio runtime
    ///
    /// Writes already evict lazily; the sweep also reclaims series that stopped
    /// receiving samples. Abort the returned handle to stop it.
    pub fn spawn_eviction(&self, period: Duration) -> JoinHandle<()> {
        let metrics = self.metrics();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = metrics.evict_expired();
                if removed > 0 {
                    debug!(removed, "Evicted expired metric samples");
                }
            }
        })
    }
}
