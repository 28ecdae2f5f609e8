//! Exponential backoff delay computation
//!
//! `delay = min(initial_delay * backoff_factor^(attempt - 1), max_delay)`
//!
//! The computation is pure and deterministic. [`Jitter`] can be layered on
//! top; it only ever shortens the capped delay, so the monotone-then-flat
//! envelope still bounds every jittered value.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inputs to the backoff computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "crate::utils::serde::duration_millis")]
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// Delay to wait after failed attempt number `attempt` (1-based)
///
/// Attempt `0` is treated as attempt `1`. The result is whole milliseconds.
pub fn next_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    let exponent = attempt.max(1).saturating_sub(1).min(i32::MAX as u32) as i32;
    let initial_ms = config.initial_delay.as_millis() as f64;
    let max_ms = config.max_delay.as_millis() as f64;

    let raw = initial_ms * config.backoff_factor.powi(exponent);
    // powi overflows to infinity for large exponents; min() folds that to the cap
    let capped = if raw.is_nan() { max_ms } else { raw.min(max_ms) };

    Duration::from_millis(capped.max(0.0) as u64)
}

/// Randomisation applied on top of the computed delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Use the computed delay as-is
    #[default]
    None,
    /// Uniform in `0..=delay`
    Full,
    /// Uniform in `delay/2..=delay`
    Equal,
}

impl Jitter {
    /// Apply jitter to `delay`; never returns more than `delay`
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(random_up_to(millis)),
            Jitter::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + random_up_to(millis - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}
