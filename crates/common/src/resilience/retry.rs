//! Retry executor with bounded exponential backoff
//!
//! [`RetryExecutor`] drives an async operation until it succeeds or
//! `max_attempts` is reached. Every failure is retried: the executor never
//! inspects the error to decide retryability, so callers that need
//! non-retryable error classes must filter before invoking it.
//!
//! Waits between attempts use `tokio::time::sleep`, so they yield to other
//! tasks instead of blocking the thread. The executor holds no mutable state
//! and can be shared freely across concurrent calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use super::backoff::{next_delay, BackoffConfig, Jitter};
use super::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    /// Delay curve between attempts
    pub backoff: BackoffConfig,
    /// Optional randomisation of each delay
    pub jitter: Jitter,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: BackoffConfig::default(), jitter: Jitter::None }
    }
}

impl RetryOptions {
    /// Start a builder from the defaults
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::new()
    }

    /// Validate the options
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `max_attempts` is 0, the backoff
    /// factor is not a finite number >= 1.0, or `max_delay` is shorter than
    /// `initial_delay`.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be at least 1"));
        }

        let factor = self.backoff.backoff_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::invalid(format!(
                "backoff_factor must be a finite number >= 1.0, got {factor}"
            )));
        }

        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err(ConfigError::invalid(format!(
                "max_delay ({:?}) must not be shorter than initial_delay ({:?})",
                self.backoff.max_delay, self.backoff.initial_delay
            )));
        }

        Ok(())
    }

    /// Delay after failed attempt `attempt`, jitter included
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.jitter.apply(next_delay(attempt, &self.backoff))
    }
}

/// Builder for [`RetryOptions`]
#[derive(Debug, Default)]
pub struct RetryOptionsBuilder {
    options: RetryOptions,
}

impl RetryOptionsBuilder {
    /// Start from [`RetryOptions::default`]
    pub fn new() -> Self {
        Self { options: RetryOptions::default() }
    }

    /// Set the total number of attempts, the first one included
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.options.max_attempts = attempts;
        self
    }

    /// Set the delay after the first failed attempt
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.options.backoff.initial_delay = delay;
        self
    }

    /// Set the cap applied to every computed delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.options.backoff.max_delay = delay;
        self
    }

    /// Set the multiplier applied per additional attempt
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.options.backoff.backoff_factor = factor;
        self
    }

    /// Set the randomisation applied after the cap
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.options.jitter = jitter;
        self
    }

    /// Build and validate the options
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` under the same conditions as
    /// [`RetryOptions::validate`].
    pub fn build(self) -> ConfigResult<RetryOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Record of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttemptOutcome {
    /// 1-based attempt number
    pub attempt: u32,
    /// Whether the operation returned `Ok`
    pub succeeded: bool,
    /// Display form of the failure, if the attempt failed
    pub error: Option<String>,
    /// Wait scheduled before the next attempt; `None` for the final attempt
    pub delay_before_next: Option<Duration>,
    /// Time spent inside the operation itself
    pub elapsed: Duration,
}

/// Result of a retried operation together with its attempt history
#[derive(Debug)]
pub struct RetryOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Value of the successful attempt, or the terminal error
    pub result: ResilienceResult<T, E>,
    /// One record per attempt, in order
    pub attempts: Vec<RetryAttemptOutcome>,
    /// Sum of the waits between attempts
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Number of attempts made
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Number of retries scheduled (attempts followed by a wait)
    pub fn retry_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.delay_before_next.is_some()).count()
    }

    /// Consume the outcome and keep only the result
    pub fn into_result(self) -> ResilienceResult<T, E> {
        self.result
    }
}

/// Drives an async operation through the backoff policy
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    options: RetryOptions,
}

impl RetryExecutor {
    /// Create an executor; fails fast on invalid options
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `options` fails validation.
    pub fn new(options: RetryOptions) -> ConfigResult<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Executor with the default options
    pub fn with_defaults() -> Self {
        Self { options: RetryOptions::default() }
    }

    /// Options this executor was built with
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Run `operation` with retries and return its value or the terminal error
    ///
    /// Each failed attempt that will be retried logs at `warn`; the final
    /// failure logs at `error`.
    ///
    /// # Errors
    /// Returns `ResilienceError::RetriesExhausted` carrying the last error
    /// once `max_attempts` attempts have failed.
    ///
    /// # Example
    /// ```no_run
    /// use farmgate_common::resilience::{RetryExecutor, RetryOptions};
    ///
    /// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    /// let executor = RetryExecutor::new(RetryOptions::builder().max_attempts(5).build()?)?;
    /// let body = executor
    ///     .execute("fetch-harvest-report", || async { Ok::<_, std::io::Error>("report") })
    ///     .await?;
    /// assert_eq!(body, "report");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.execute_with_outcome(operation_name, operation).await.into_result()
    }

    /// Run `operation` with retries and keep the per-attempt history
    ///
    /// Never fails itself; the terminal error is in [`RetryOutcome::result`].
    #[instrument(skip(self, operation), fields(max_attempts = self.options.max_attempts))]
    pub async fn execute_with_outcome<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let max_attempts = self.options.max_attempts;
        let mut attempts = Vec::with_capacity(max_attempts.min(16) as usize);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 1;

        loop {
            let started = Instant::now();
            let result = operation().await;
            let elapsed = started.elapsed();

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                    }
                    attempts.push(RetryAttemptOutcome {
                        attempt,
                        succeeded: true,
                        error: None,
                        delay_before_next: None,
                        elapsed,
                    });
                    return RetryOutcome { result: Ok(value), attempts, total_delay };
                }
                Err(err) if attempt >= max_attempts => {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "Operation failed after exhausting all attempts"
                    );
                    attempts.push(RetryAttemptOutcome {
                        attempt,
                        succeeded: false,
                        error: Some(err.to_string()),
                        delay_before_next: None,
                        elapsed,
                    });
                    return RetryOutcome {
                        result: Err(ResilienceError::RetriesExhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            source: err,
                        }),
                        attempts,
                        total_delay,
                    };
                }
                Err(err) => {
                    let delay = self.options.delay_for_attempt(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );
                    attempts.push(RetryAttemptOutcome {
                        attempt,
                        succeeded: false,
                        error: Some(err.to_string()),
                        delay_before_next: Some(delay),
                        elapsed,
                    });

                    tokio::time::sleep(delay).await;
                    total_delay += delay;
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `operation` once through a fresh executor built from `options`
///
/// # Errors
/// The outer `Err` is a `ConfigError` for invalid `options`, returned before
/// the operation is invoked. The inner result is that of
/// [`RetryExecutor::execute`].
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    options: RetryOptions,
    operation: F,
) -> Result<ResilienceResult<T, E>, ConfigError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let executor = RetryExecutor::new(options)?;
    Ok(executor.execute(operation_name, operation).await)
}
