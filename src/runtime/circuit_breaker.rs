// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker pattern implementation for resilient HTTP calls.
//!
//! The circuit breaker prevents cascading failures by temporarily stopping
//! requests to failing dependencies and allowing them to recover.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through. Counts are cleared
//!   at the end of every rolling `interval`.
//! - **Open**: Requests immediately fail until `timeout` has elapsed.
//! - **Half-Open**: Up to `max_requests` probes pass through. That many
//!   consecutive successes close the circuit, any failure reopens it.
//!
//! Every state change starts a new generation. Outcomes reported for an
//! admission from an older generation are ignored.
//!
//! # Example
//!
//! ```
//! use httpclient_rs::runtime::{CircuitBreaker, CircuitBreakerConfig};
//! use httpclient_rs::HttpClientError;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = CircuitBreakerConfig::named("users")
//!     .with_consecutive_failures(5)
//!     .with_timeout(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new(config);
//!
//! let result = breaker
//!     .execute(|| async { Ok::<_, HttpClientError>("pong") })
//!     .await;
//! assert_eq!(result.unwrap(), "pong");
//! # }
//! ```

use crate::error::{HttpClientError, Result};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is half-open, testing if the dependency has recovered.
    HalfOpen,
    /// Circuit is open, requests fail immediately.
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::HalfOpen => write!(f, "half-open"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

/// Request and outcome counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Admitted requests.
    pub requests: u32,
    /// Successful outcomes.
    pub total_successes: u32,
    /// Failed outcomes.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Failures divided by admitted requests, `0.0` when nothing was admitted.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }
}

/// Predicate deciding whether the closed circuit should open.
pub type ReadyToTrip = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Callback invoked with `(name, from, to)` after every state change.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Configuration for the circuit breaker.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Breaker name, used in errors and logs.
    pub name: String,
    /// Maximum requests admitted while half-open, and the number of
    /// consecutive successes needed to close again. `0` is treated as `1`.
    pub max_requests: u32,
    /// Rolling window after which closed-state counts are cleared.
    /// `Duration::ZERO` never clears them.
    pub interval: Duration,
    /// Time spent open before moving to half-open.
    /// `Duration::ZERO` falls back to 60 seconds.
    pub timeout: Duration,
    /// Trip when the failure ratio reaches this value.
    pub failure_ratio: f64,
    /// Trip when this many failures happen in a row.
    pub consecutive_failures: u32,
    ready_to_trip: Option<ReadyToTrip>,
    on_state_change: Option<StateChangeHook>,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("failure_ratio", &self.failure_ratio)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("custom_ready_to_trip", &self.ready_to_trip.is_some())
            .field("custom_on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_requests: 15,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(45),
            failure_ratio: 0.6,
            consecutive_failures: 100,
            ready_to_trip: None,
            on_state_change: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration under the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::default().with_name(name)
    }

    /// Set the breaker name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum half-open requests.
    #[must_use]
    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests = max;
        self
    }

    /// Set the rolling window for closed-state counts.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the open-state timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the failure ratio that trips the circuit.
    #[must_use]
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Set the consecutive-failure count that trips the circuit.
    #[must_use]
    pub fn with_consecutive_failures(mut self, count: u32) -> Self {
        self.consecutive_failures = count;
        self
    }

    /// Replace the ratio-or-consecutive trip rule with a custom predicate.
    #[must_use]
    pub fn with_ready_to_trip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(predicate));
        self
    }

    /// Replace the default logging state-change callback.
    #[must_use]
    pub fn with_on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    /// Evaluate the trip rule against the current counts.
    #[must_use]
    pub fn should_trip(&self, counts: &Counts) -> bool {
        match &self.ready_to_trip {
            Some(predicate) => predicate(counts),
            None => {
                counts.failure_ratio() >= self.failure_ratio
                    || counts.consecutive_failures >= self.consecutive_failures
            }
        }
    }

    fn effective_max_requests(&self) -> u32 {
        self.max_requests.max(1)
    }

    fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            Duration::from_secs(60)
        } else {
            self.timeout
        }
    }
}

/// Proof that a breaker admitted a request.
///
/// Hand it back to [`Breaker::report`] once the outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    generation: u64,
}

/// A pluggable breaker engine consumed by the circuit-breaker layer.
pub trait Breaker: Send + Sync {
    /// Breaker name.
    fn name(&self) -> &str;

    /// Current state, applying any time-based transition first.
    fn state(&self) -> CircuitState;

    /// Ask to run one request.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::CircuitOpen` while open, and
    /// `HttpClientError::TooManyRequests` when the half-open quota is used.
    fn allow(&self) -> Result<Admission>;

    /// Report the outcome of an admitted request.
    fn report(&self, admission: Admission, success: bool);
}

impl<T: Breaker + ?Sized> Breaker for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn state(&self) -> CircuitState {
        (**self).state()
    }

    fn allow(&self) -> Result<Admission> {
        (**self).allow()
    }

    fn report(&self, admission: Admission, success: bool) {
        (**self).report(admission, success)
    }
}

impl<T: Breaker + ?Sized> Breaker for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn state(&self) -> CircuitState {
        (**self).state()
    }

    fn allow(&self) -> Result<Admission> {
        (**self).allow()
    }

    fn report(&self, admission: Admission, success: bool) {
        (**self).report(admission, success)
    }
}

/// Reports an admission exactly once, as a failure if it is dropped unreported.
pub(crate) struct OutcomeGuard<K: Breaker> {
    breaker: K,
    admission: Option<Admission>,
}

impl<K: Breaker> OutcomeGuard<K> {
    pub(crate) fn new(breaker: K, admission: Admission) -> Self {
        Self {
            breaker,
            admission: Some(admission),
        }
    }

    pub(crate) fn report(mut self, success: bool) {
        if let Some(admission) = self.admission.take() {
            self.breaker.report(admission, success);
        }
    }
}

impl<K: Breaker> Drop for OutcomeGuard<K> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.report(admission, false);
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the current rolling window (closed) or of the open period.
    expiry: Option<Instant>,
}

type Transition = (CircuitState, CircuitState);

/// Circuit breaker for protecting against cascading failures.
///
/// Closed/Open/Half-Open engine with a rolling count window and a
/// ratio-or-consecutive trip rule.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.lock().state)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let expiry = closed_expiry(&config, Instant::now());
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    /// Create a circuit breaker with default configuration under `name`.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(CircuitBreakerConfig::named(name))
    }

    /// Get the circuit breaker configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Counts for the current generation.
    #[must_use]
    pub fn counts(&self) -> Counts {
        let now = Instant::now();
        let (counts, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, now);
            (inner.counts, transition)
        };
        self.notify(transition);
        counts
    }

    /// Check if the circuit allows requests right now.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        let now = Instant::now();
        let (allowed, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, now);
            let allowed = match inner.state {
                CircuitState::Closed => true,
                CircuitState::Open => false,
                CircuitState::HalfOpen => {
                    inner.counts.requests < self.config.effective_max_requests()
                }
            };
            (allowed, transition)
        };
        self.notify(transition);
        allowed
    }

    /// Time left until an open circuit moves to half-open.
    #[must_use]
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.state, inner.expiry) {
            (CircuitState::Open, Some(expiry)) => {
                Some(expiry.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }

    /// Execute an async operation with circuit breaker protection.
    ///
    /// Dropping the returned future after admission counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns the breaker rejection if the circuit refuses the call,
    /// otherwise the operation's own error.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = OutcomeGuard::new(self, self.allow()?);
        let result = operation().await;
        guard.report(result.is_ok());
        result
    }

    /// Force the circuit open, as if it had just tripped.
    pub fn trip(&self) {
        let transition = {
            let mut inner = self.lock();
            self.set_state(&mut inner, CircuitState::Open, Instant::now())
        };
        self.notify(transition);
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.lock();
            let now = Instant::now();
            let transition = self.set_state(&mut inner, CircuitState::Closed, now);
            if transition.is_none() {
                self.new_generation(&mut inner, now);
            }
            transition
        };
        self.notify(transition);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply time-based transitions.
    fn refresh(&self, inner: &mut BreakerState, now: Instant) -> Option<Transition> {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
                None
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => None,
        }
    }

    fn set_state(
        &self,
        inner: &mut BreakerState,
        state: CircuitState,
        now: Instant,
    ) -> Option<Transition> {
        if inner.state == state {
            return None;
        }
        let previous = inner.state;
        inner.state = state;
        self.new_generation(inner, now);
        Some((previous, state))
    }

    fn new_generation(&self, inner: &mut BreakerState, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => closed_expiry(&self.config, now),
            // An open period too long to represent never ends.
            CircuitState::Open => now.checked_add(self.config.effective_timeout()),
            CircuitState::HalfOpen => None,
        };
    }

    fn notify(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };
        match &self.config.on_state_change {
            Some(hook) => hook(&self.config.name, from, to),
            None => info!(
                target: "httpclient::circuit_breaker",
                name = %self.config.name,
                from = %from,
                to = %to,
                "circuit breaker changed state"
            ),
        }
    }
}

impl Breaker for CircuitBreaker {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CircuitState {
        let now = Instant::now();
        let (state, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, now);
            (inner.state, transition)
        };
        self.notify(transition);
        state
    }

    fn allow(&self) -> Result<Admission> {
        let now = Instant::now();
        let (result, transition) = {
            let mut inner = self.lock();
            let transition = self.refresh(&mut inner, now);
            let result = match inner.state {
                CircuitState::Open => Err(HttpClientError::CircuitOpen {
                    name: self.config.name.clone(),
                }),
                CircuitState::HalfOpen
                    if inner.counts.requests >= self.config.effective_max_requests() =>
                {
                    Err(HttpClientError::TooManyRequests {
                        name: self.config.name.clone(),
                    })
                }
                _ => {
                    inner.counts.on_request();
                    Ok(Admission {
                        generation: inner.generation,
                    })
                }
            };
            (result, transition)
        };
        self.notify(transition);
        result
    }

    fn report(&self, admission: Admission, success: bool) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.lock();
            let refreshed = self.refresh(&mut inner, now);
            if inner.generation != admission.generation {
                refreshed
            } else if success {
                inner.counts.on_success();
                if inner.state == CircuitState::HalfOpen
                    && inner.counts.consecutive_successes >= self.config.effective_max_requests()
                {
                    self.set_state(&mut inner, CircuitState::Closed, now)
                } else {
                    refreshed
                }
            } else {
                match inner.state {
                    CircuitState::Closed => {
                        inner.counts.on_failure();
                        if self.config.should_trip(&inner.counts) {
                            self.set_state(&mut inner, CircuitState::Open, now)
                        } else {
                            refreshed
                        }
                    }
                    CircuitState::HalfOpen => self.set_state(&mut inner, CircuitState::Open, now),
                    CircuitState::Open => refreshed,
                }
            }
        };
        self.notify(transition);
    }
}

fn closed_expiry(config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
    if config.interval.is_zero() {
        None
    } else {
        now.checked_add(config.interval)
    }
}
