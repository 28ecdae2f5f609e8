//! Error types for resilient execution

use thiserror::Error;

/// Invalid configuration detected while building a resilience component
///
/// Raised at construction time so misconfiguration never surfaces mid-call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Terminal failures surfaced by the retry executor and the circuit breaker
///
/// Generic over the wrapped operation's error `E` so the last underlying
/// failure is preserved as the error source.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Every attempt failed; carries the last failure
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// The circuit for `key` is open and the call was not attempted
    #[error("Circuit breaker open for '{key}', call rejected")]
    CircuitOpen { key: String },

    /// A single guarded call failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether this is a short-circuit rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Number of attempts made before giving up, if any were made
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            Self::OperationFailed { .. } => Some(1),
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Borrow the underlying operation error, if there is one
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::OperationFailed { source } => {
                Some(source)
            }
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Consume and return the underlying operation error, if there is one
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::OperationFailed { source } => {
                Some(source)
            }
            Self::CircuitOpen { .. } => None,
        }
    }
}

/// Result type for resilient operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
