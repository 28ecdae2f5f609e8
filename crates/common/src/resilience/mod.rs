//! Resilience primitives for calls to unreliable dependencies
//!
//! - **Backoff**: pure exponential delay computation with optional jitter
//! - **Retry**: re-runs a fallible async operation with backoff between attempts
//! - **Circuit breaker**: keyed breaker that short-circuits failing operation
//!   classes and admits a single trial call after a cooldown
//!
//! All components take their time source from [`Clock`], so tests can drive
//! cooldowns with [`MockClock`]. Retry delays go through `tokio::time` and can
//! be fast-forwarded with a paused runtime.
//!
//! ```no_run
//! use farmgate_common::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryExecutor, RetryOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default())?;
//! let executor = RetryExecutor::new(RetryOptions::builder().max_attempts(3).build()?)?;
//!
//! let value = executor
//!     .execute("fetch-prices", || async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! let guarded = breaker.call("prices", || async { Ok::<_, std::io::Error>(value) }).await?;
//! assert_eq!(guarded, 42);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod retry;

pub use backoff::{next_delay, BackoffConfig, Jitter};
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitSnapshot, CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
pub use retry::{
    retry, RetryAttemptOutcome, RetryExecutor, RetryOptions, RetryOptionsBuilder, RetryOutcome,
};
