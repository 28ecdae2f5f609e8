//! Shared building blocks for Farmgate crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: serde helpers for configuration types
//! - `runtime`: resilience (retry, backoff, circuit breaker) and the metric
//!   store

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod metrics;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use metrics::{MetricStats, MetricStore, MetricStoreConfig};
#[cfg(feature = "runtime")]
pub use resilience::{
    retry, CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
    Clock, ConfigError, MockClock, ResilienceError, ResilienceResult, RetryExecutor,
    RetryOptions, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::{duration_millis, duration_secs};
