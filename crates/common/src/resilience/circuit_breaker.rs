//! Keyed circuit breaker
//!
//! One breaker instance guards many operation classes, each identified by a
//! string key (an endpoint, a remote API name, ...). State for a key is
//! created lazily on first use and lives as long as the breaker.
//!
//! State machine per key:
//!
//! ```text
//!            failure_count >= threshold
//!   CLOSED ------------------------------> OPEN
//!     ^                                     |  timeout elapsed:
//!     |       trial succeeded               |  admit exactly one trial
//!     +---------------------------- HALF_OPEN (trial in flight)
//!                                           |
//!                trial failed: stay OPEN, refresh last_failure_time
//! ```
//!
//! Every admitted call must be paired with exactly one outcome. The
//! [`CallPermit`] returned by [`CircuitBreaker::try_acquire`] enforces this:
//! dropping an uncompleted permit records a failure.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};

/// Observable state of a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are short-circuited
    Open,
    /// A single trial call is in flight
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Policy for one circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u64,
    /// Cooldown after the last failure before a trial call is admitted
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, timeout: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Start from [`CircuitBreakerConfig::default`]
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    /// Set the number of consecutive failures that opens the circuit
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the cooldown before a trial call is admitted
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `failure_threshold` is 0.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of one circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u64,
    /// Monotonic time of the failure that opened or kept the circuit open
    pub last_failure_time: Option<Instant>,
    /// Same failure as milliseconds since the UNIX epoch, for reporting
    pub last_failure_at_ms: Option<u64>,
    pub failure_threshold: u64,
    pub timeout: Duration,
}

#[derive(Debug)]
struct KeyState {
    config: CircuitBreakerConfig,
    is_open: bool,
    failure_count: u64,
    last_failure_time: Option<Instant>,
    last_failure_at_ms: Option<u64>,
    trial_in_flight: bool,
}

impl KeyState {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            is_open: false,
            failure_count: 0,
            last_failure_time: None,
            last_failure_at_ms: None,
            trial_in_flight: false,
        }
    }

    fn stamp_failure(&mut self, now: Instant, epoch_ms: u64) {
        self.last_failure_time = Some(now);
        self.last_failure_at_ms = Some(epoch_ms);
    }

    fn state(&self) -> CircuitState {
        match (self.is_open, self.trial_in_flight) {
            (false, _) => CircuitState::Closed,
            (true, true) => CircuitState::HalfOpen,
            (true, false) => CircuitState::Open,
        }
    }
}

/// How a call was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Circuit breaker guarding any number of keyed operation classes
///
/// Each key's state sits behind its own map entry lock, so concurrent
/// `before_call`/`after_call` for the same key are serialised while
/// different keys proceed independently.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    default_config: CircuitBreakerConfig,
    states: DashMap<String, KeyState>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("default_config", &self.default_config)
            .field("keys", &self.states.len())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker whose keys default to `config`
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    ///
    /// # Example
    /// ```
    /// use farmgate_common::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    ///
    /// let breaker = CircuitBreaker::new(CircuitBreakerConfig::default())?;
    /// assert_eq!(breaker.state("weather-api"), CircuitState::Closed);
    /// # Ok::<(), farmgate_common::resilience::ConfigError>(())
    /// ```
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a breaker with the default policy
    pub fn with_defaults() -> Self {
        Self {
            default_config: CircuitBreakerConfig::default(),
            states: DashMap::new(),
            clock: SystemClock,
        }
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker driven by a custom clock
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { default_config: config, states: DashMap::new(), clock })
    }

    /// Policy applied to keys that were never configured explicitly
    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Set the policy for `key`, keeping its current counters
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if `config` fails validation; the
    /// existing policy is left untouched.
    pub fn configure(&self, key: &str, config: CircuitBreakerConfig) -> ConfigResult<()> {
        config.validate()?;
        self.states
            .entry(key.to_string())
            .and_modify(|state| state.config = config.clone())
            .or_insert_with(|| KeyState::new(config));
        Ok(())
    }

    /// Whether a call for `key` may proceed
    ///
    /// A `true` result must be followed by exactly one
    /// [`after_call`](Self::after_call). Prefer
    /// [`try_acquire`](Self::try_acquire), which guarantees the pairing.
    pub fn before_call(&self, key: &str) -> bool {
        self.admit(key).is_some()
    }

    /// Report the outcome of a call admitted by [`before_call`](Self::before_call)
    ///
    /// While a trial is in flight, the next reported outcome is taken as the
    /// trial's result.
    pub fn after_call(&self, key: &str, succeeded: bool) {
        self.record(key, succeeded, None);
    }

    /// Admit a call and return a permit that records its outcome
    ///
    /// Returns `None` while the circuit is open, or while another caller
    /// holds the trial permit.
    pub fn try_acquire(&self, key: &str) -> Option<CallPermit<'_, C>> {
        self.admit(key).map(|admission| CallPermit {
            breaker: self,
            key: key.to_string(),
            admission,
            completed: false,
        })
    }

    /// Run `operation` under the circuit for `key`
    ///
    /// # Errors
    /// Returns `ResilienceError::CircuitOpen` without invoking `operation`
    /// when the call is not admitted, and `ResilienceError::OperationFailed`
    /// wrapping the operation's own error otherwise.
    pub async fn call<F, Fut, T, E>(&self, key: &str, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Some(permit) = self.try_acquire(key) else {
            debug!(key, "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen { key: key.to_string() });
        };

        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(source) => {
                permit.fail();
                Err(ResilienceError::OperationFailed { source })
            }
        }
    }

    /// Current state of `key`; unknown keys are closed
    pub fn state(&self, key: &str) -> CircuitState {
        self.states.get(key).map(|state| state.state()).unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of `key`, if it has been used
    pub fn snapshot(&self, key: &str) -> Option<CircuitSnapshot> {
        self.states.get(key).map(|state| CircuitSnapshot {
            key: key.to_string(),
            state: state.state(),
            failure_count: state.failure_count,
            last_failure_time: state.last_failure_time,
            last_failure_at_ms: state.last_failure_at_ms,
            failure_threshold: state.config.failure_threshold,
            timeout: state.config.timeout,
        })
    }

    /// Keys with live state
    pub fn keys(&self) -> Vec<String> {
        self.states.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Force `key` back to closed, keeping its policy
    pub fn reset(&self, key: &str) {
        if let Some(mut state) = self.states.get_mut(key) {
            state.is_open = false;
            state.failure_count = 0;
            state.last_failure_time = None;
            state.last_failure_at_ms = None;
            state.trial_in_flight = false;
            info!(key, "Circuit breaker manually reset to closed state");
        }
    }

    fn with_state<R>(&self, key: &str, f: impl FnOnce(&mut KeyState) -> R) -> R {
        if let Some(mut state) = self.states.get_mut(key) {
            return f(&mut state);
        }
        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(self.default_config.clone()));
        f(&mut state)
    }

    fn admit(&self, key: &str) -> Option<Admission> {
        let now = self.clock.now();
        self.with_state(key, |state| {
            if !state.is_open {
                return Some(Admission::Normal);
            }
            if state.trial_in_flight {
                return None;
            }

            let cooled_down = state
                .last_failure_time
                .map_or(true, |failed_at| now.saturating_duration_since(failed_at) >= state.config.timeout);
            if cooled_down {
                state.trial_in_flight = true;
                debug!(key, "Circuit breaker admitting trial call");
                Some(Admission::Trial)
            } else {
                None
            }
        })
    }

    fn record(&self, key: &str, succeeded: bool, admission: Option<Admission>) {
        let now = self.clock.now();
        let epoch_ms = self.clock.millis_since_epoch();
        self.with_state(key, |state| {
            let is_trial_result =
                state.trial_in_flight && admission.map_or(true, |a| a == Admission::Trial);

            if is_trial_result {
                state.trial_in_flight = false;
                if succeeded {
                    state.is_open = false;
                    state.failure_count = 0;
                    info!(key, "Circuit breaker closed after successful trial call");
                } else {
                    state.failure_count = state.failure_count.saturating_add(1);
                    state.stamp_failure(now, epoch_ms);
                    warn!(key, "Trial call failed, circuit breaker stays open");
                }
            } else if !state.is_open {
                if succeeded {
                    state.failure_count = 0;
                } else {
                    state.failure_count = state.failure_count.saturating_add(1);
                    state.stamp_failure(now, epoch_ms);
                    if state.failure_count >= state.config.failure_threshold {
                        state.is_open = true;
                        warn!(
                            key,
                            failures = state.failure_count,
                            "Circuit breaker opened after consecutive failures"
                        );
                    }
                }
            } else if !succeeded {
                // Admitted before the circuit opened; counts, but does not extend the cooldown
                state.failure_count = state.failure_count.saturating_add(1);
            }
        });
    }
}

/// Scoped admission for one call
///
/// Complete with [`succeed`](Self::succeed) or [`fail`](Self::fail). A permit
/// dropped without completion (error path, cancelled future) is recorded as
/// a failure.
pub struct CallPermit<'a, C: Clock = SystemClock> {
    breaker: &'a CircuitBreaker<C>,
    key: String,
    admission: Admission,
    completed: bool,
}

impl<C: Clock> CallPermit<'_, C> {
    /// Whether this permit is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.admission == Admission::Trial
    }

    /// Key this permit was issued for
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record a successful call
    pub fn succeed(self) {
        self.complete(true);
    }

    /// Record a failed call
    pub fn fail(self) {
        self.complete(false);
    }

    /// Record the call's outcome; a trial permit closes or re-opens the circuit
    pub fn complete(mut self, succeeded: bool) {
        self.finish(succeeded);
    }

    fn finish(&mut self, succeeded: bool) {
        if !self.completed {
            self.completed = true;
            self.breaker.record(&self.key, succeeded, Some(self.admission));
        }
    }
}

impl<C: Clock> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        if !self.completed {
            debug!(key = %self.key, "Call permit dropped without outcome, recording failure");
            self.finish(false);
        }
    }
}

impl<C: Clock> fmt::Debug for CallPermit<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("key", &self.key)
            .field("trial", &self.is_trial())
            .field("completed", &self.completed)
            .finish()
    }
}
