//! Default values for configuration
//!
//! Centralized so the loader, the config types and the docs agree.

// Batch processing
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;

// Circuit breaker
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u64 = 5;
pub const DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MS: u64 = 60_000;

// Metric store
pub const DEFAULT_METRICS_RETENTION_SECS: u64 = 3_600;
pub const DEFAULT_METRICS_MAX_SAMPLES: usize = 10_000;

// Logging
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const LOG_FILE_PREFIX: &str = "farmgate.log";
