//! Bounded in-memory metric store
//!
//! Each series is a `VecDeque` of timestamped samples kept in insertion
//! order. Memory is bounded two ways:
//!
//! - samples older than `retention` are evicted from a series whenever that
//!   series is written (lazy, no background timer)
//! - a series never holds more than `max_samples_per_series` samples; the
//!   oldest are dropped first
//!
//! Reads never mutate the store, but they skip samples that have aged out
//! and are still waiting for the next write to evict them.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::stats::MetricStats;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::error::{ConfigError, ConfigResult};

/// Store limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricStoreConfig {
    /// Maximum sample age
    #[serde(with = "crate::utils::serde::duration_secs")]
    pub retention: Duration,
    /// Per-series sample cap
    pub max_samples_per_series: usize,
}

impl Default for MetricStoreConfig {
    fn default() -> Self {
        Self { retention: Duration::from_secs(3600), max_samples_per_series: 10_000 }
    }
}

impl MetricStoreConfig {
    /// Validate the limits
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for a zero retention or a zero
    /// sample cap.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retention.is_zero() {
            return Err(ConfigError::invalid("metric retention must be greater than 0"));
        }
        if self.max_samples_per_series == 0 {
            return Err(ConfigError::invalid("max_samples_per_series must be at least 1"));
        }
        Ok(())
    }
}

/// One recorded value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Monotonic time of the `record` call
    pub recorded_at: Instant,
    pub value: f64,
}

/// Thread-safe store of named time series and custom metrics
pub struct MetricStore<C: Clock = SystemClock> {
    config: MetricStoreConfig,
    series: RwLock<HashMap<String, VecDeque<Sample>>>,
    custom: RwLock<HashMap<String, Value>>,
    clock: C,
}

impl<C: Clock> fmt::Debug for MetricStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricStore")
            .field("config", &self.config)
            .field("series", &self.series.read().len())
            .field("custom", &self.custom.read().len())
            .finish()
    }
}

impl MetricStore<SystemClock> {
    /// Create a store on the system clock
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    ///
    /// # Example
    /// ```
    /// use farmgate_common::metrics::{MetricStore, MetricStoreConfig};
    ///
    /// let store = MetricStore::new(MetricStoreConfig::default())?;
    /// for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
    ///     store.record("orders.latency_ms", value);
    /// }
    /// assert_eq!(store.get_stats("orders.latency_ms", None).avg, 3.0);
    /// # Ok::<(), farmgate_common::resilience::ConfigError>(())
    /// ```
    pub fn new(config: MetricStoreConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a store with one hour of retention and 10 000 samples per series
    pub fn with_defaults() -> Self {
        Self::from_parts(MetricStoreConfig::default(), SystemClock)
    }
}

impl Default for MetricStore<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> MetricStore<C> {
    /// Create a store driven by a custom clock
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    pub fn with_clock(config: MetricStoreConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, clock))
    }

    fn from_parts(config: MetricStoreConfig, clock: C) -> Self {
        Self {
            config,
            series: RwLock::new(HashMap::new()),
            custom: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Limits this store enforces
    pub fn config(&self) -> &MetricStoreConfig {
        &self.config
    }

    /// Append `value` to series `name`, then evict that series' expired samples
    pub fn record(&self, name: &str, value: f64) {
        let now = self.clock.now();
        let cutoff = now.checked_sub(self.config.retention);

        let mut series = self.series.write();
        let samples = series.entry(name.to_string()).or_default();

        samples.push_back(Sample { recorded_at: now, value });

        let evicted = evict(samples, cutoff, self.config.max_samples_per_series);
        if evicted > 0 {
            trace!(metric = name, evicted, "Evicted expired samples");
        }
    }

    /// Record a duration in milliseconds
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.record(name, duration.as_secs_f64() * 1000.0);
    }

    /// Statistics over retained samples of `name`
    ///
    /// With `window`, only samples recorded within the last `window` count.
    /// Absent or empty series yield all-zero stats.
    pub fn get_stats(&self, name: &str, window: Option<Duration>) -> MetricStats {
        let values = self.values_since(name, window);
        MetricStats::from_values(&values)
    }

    /// Retained values of every series, each in insertion order
    pub fn get_all_metrics(&self) -> BTreeMap<String, Vec<f64>> {
        let cutoff = self.retention_cutoff();
        self.series
            .read()
            .iter()
            .map(|(name, samples)| (name.clone(), retained(samples, cutoff).collect()))
            .collect()
    }

    /// Retained values of one series in insertion order
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.values_since(name, None)
    }

    /// Store a custom metric, replacing any previous value
    pub fn set_custom_metric(&self, name: &str, value: Value) {
        self.custom.write().insert(name.to_string(), value);
    }

    /// Last value stored under `name`
    pub fn get_custom_metric(&self, name: &str) -> Option<Value> {
        self.custom.read().get(name).cloned()
    }

    /// Drop every series and custom metric; calling it again is a no-op
    pub fn clear_metrics(&self) {
        self.series.write().clear();
        self.custom.write().clear();
    }

    /// Names of all series, sorted
    pub fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Statistics for every series
    pub fn summary(&self) -> BTreeMap<String, MetricStats> {
        self.get_all_metrics()
            .into_iter()
            .map(|(name, values)| {
                let stats = MetricStats::from_values(&values);
                (name, stats)
            })
            .collect()
    }

    /// Evict expired samples from every series and drop series left empty
    ///
    /// Returns the number of samples removed.
    pub fn evict_expired(&self) -> usize {
        let cutoff = self.retention_cutoff();
        let cap = self.config.max_samples_per_series;

        let mut series = self.series.write();
        let mut removed = 0;
        series.retain(|_, samples| {
            removed += evict(samples, cutoff, cap);
            !samples.is_empty()
        });
        removed
    }

    fn retention_cutoff(&self) -> Option<Instant> {
        self.clock.now().checked_sub(self.config.retention)
    }

    fn values_since(&self, name: &str, window: Option<Duration>) -> Vec<f64> {
        let now = self.clock.now();
        let retention_cutoff = now.checked_sub(self.config.retention);
        let window_cutoff = window.and_then(|w| now.checked_sub(w));
        let cutoff = retention_cutoff.max(window_cutoff);

        self.series
            .read()
            .get(name)
            .map(|samples| retained(samples, cutoff).collect())
            .unwrap_or_default()
    }
}

/// Samples at or after `cutoff`, in insertion order
fn retained(
    samples: &VecDeque<Sample>,
    cutoff: Option<Instant>,
) -> impl Iterator<Item = f64> + '_ {
    samples
        .iter()
        .filter(move |sample| cutoff.map_or(true, |cutoff| sample.recorded_at >= cutoff))
        .map(|sample| sample.value)
}

/// Pop samples older than `cutoff` and beyond `cap` from the front
fn evict(samples: &mut VecDeque<Sample>, cutoff: Option<Instant>, cap: usize) -> usize {
    let before = samples.len();

    if let Some(cutoff) = cutoff {
        while samples.front().is_some_and(|sample| sample.recorded_at < cutoff) {
            samples.pop_front();
        }
    }
    while samples.len() > cap {
        samples.pop_front();
    }

    before - samples.len()
}
