//! Configuration management
//!
//! Every section deserializes with defaults for missing fields, so a config
//! file only needs to name what it overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{FarmgateError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch: BatchProcessorConfig,
    pub retry: RetrySettings,
    pub metrics: MetricsSettings,
    pub logging: LoggingSettings,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.batch.validate()?;
        self.retry.validate()?;
        self.metrics.validate()?;
        self.logging.validate()
    }
}

/// Batch processing policy
///
/// `max_retries` is the total number of attempts per item, the first one
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchProcessorConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub concurrency_limit: usize,
    pub circuit_breaker_threshold: u64,
    pub circuit_breaker_timeout_ms: u64,
}

impl Default for BatchProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: false,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            circuit_breaker_threshold: DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            circuit_breaker_timeout_ms: DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MS,
        }
    }
}

impl BatchProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries < 1 {
            return Err(invalid("batch.max_retries must be at least 1"));
        }
        if self.concurrency_limit < 1 {
            return Err(invalid("batch.concurrency_limit must be at least 1"));
        }
        if self.circuit_breaker_threshold < 1 {
            return Err(invalid("batch.circuit_breaker_threshold must be at least 1"));
        }
        validate_backoff(
            "batch",
            self.retry_delay_ms,
            self.max_retry_delay_ms,
            self.backoff_factor,
        )
    }
}

/// Policy for standalone retry executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        validate_backoff("retry", self.initial_delay_ms, self.max_delay_ms, self.backoff_factor)
    }
}

/// Metric store limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub retention_secs: u64,
    pub max_samples_per_series: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_METRICS_RETENTION_SECS,
            max_samples_per_series: DEFAULT_METRICS_MAX_SAMPLES,
        }
    }
}

impl MetricsSettings {
    pub fn validate(&self) -> Result<()> {
        if self.retention_secs == 0 {
            return Err(invalid("metrics.retention_secs must be greater than 0"));
        }
        if self.max_samples_per_series == 0 {
            return Err(invalid("metrics.max_samples_per_series must be at least 1"));
        }
        Ok(())
    }
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Directory for daily rolling log files; stdout only when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: DEFAULT_LOG_FILTER.to_string(), json: false, directory: None }
    }
}

impl LoggingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.filter.trim().is_empty() {
            return Err(invalid("logging.filter must not be empty"));
        }
        Ok(())
    }
}

fn validate_backoff(section: &str, initial_ms: u64, max_ms: u64, factor: f64) -> Result<()> {
    if !factor.is_finite() || factor < 1.0 {
        return Err(invalid(format!("{section}.backoff_factor must be >= 1.0, got {factor}")));
    }
    if max_ms < initial_ms {
        return Err(invalid(format!(
            "{section} max delay ({max_ms}ms) must not be shorter than the initial delay ({initial_ms}ms)"
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> FarmgateError {
    FarmgateError::Config(message.into())
}
