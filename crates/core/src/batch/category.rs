//! Coarse classification of item failures

use std::fmt;

use farmgate_common::resilience::ResilienceError;
use serde::{Deserialize, Serialize};

/// Failure bucket used in batch summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Validation,
    Network,
    RateLimit,
    CircuitOpen,
    Unknown,
}

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests", "429"];
const VALIDATION_MARKERS: &[&str] = &["validation", "invalid", "malformed"];
const NETWORK_MARKERS: &[&str] =
    &["network", "connection", "dns", "unreachable", "broken pipe", "socket"];
const CIRCUIT_MARKERS: &[&str] = &["circuit open", "circuit breaker open"];

impl ErrorCategory {
    /// Classify a failure description by case-insensitive substring match
    ///
    /// The first matching bucket wins, checked in declaration order of the
    /// marker tables: timeout, rate limit, validation, network, circuit.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |markers: &[&str]| markers.iter().any(|marker| lower.contains(marker));

        if matches(TIMEOUT_MARKERS) {
            Self::Timeout
        } else if matches(RATE_LIMIT_MARKERS) {
            Self::RateLimit
        } else if matches(VALIDATION_MARKERS) {
            Self::Validation
        } else if matches(NETWORK_MARKERS) {
            Self::Network
        } else if matches(CIRCUIT_MARKERS) {
            Self::CircuitOpen
        } else {
            Self::Unknown
        }
    }

    /// Classify a terminal item error
    ///
    /// Short-circuited items are `CircuitOpen`; otherwise the underlying
    /// operation error is classified by its message.
    pub fn of<E>(error: &ResilienceError<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match error.source_error() {
            Some(source) => Self::classify(&source.to_string()),
            None => Self::CircuitOpen,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::CircuitOpen => "circuit_open",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
