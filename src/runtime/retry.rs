// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry policies and backoff strategies for resilient HTTP calls.
//!
//! The retry loop itself is `tower::retry::Retry`. This module supplies the
//! pieces it is driven by: a [`RetryConfig`], a [`Backoff`] strategy, a
//! [`RetryClassifier`] deciding which outcomes are worth another attempt,
//! and [`RetryPolicy`], the `tower::retry::Policy` tying them together.
//!
//! # Example
//!
//! ```
//! use httpclient_rs::runtime::{Backoff, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::builder()
//!     .max_retries(5)
//!     .wait(Duration::from_millis(100), Duration::from_secs(2))
//!     .backoff(Backoff::Exponential)
//!     .build();
//!
//! assert_eq!(retry.max_retries, 5);
//! ```

use crate::error::HttpClientError;
use http::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower::retry::Policy;
use tracing::debug;

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// A random wait between `wait_min` and `wait_max`, multiplied by the
    /// attempt number.
    #[default]
    LinearJitter,
    /// `wait_min * 2^attempt`, capped at `wait_max`.
    Exponential,
}

impl Backoff {
    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32, wait_min: Duration, wait_max: Duration) -> Duration {
        match self {
            Backoff::LinearJitter => {
                let multiplier = attempt.saturating_add(1);
                if wait_max <= wait_min {
                    return wait_min.saturating_mul(multiplier);
                }
                let spread = (wait_max - wait_min).mul_f64(rand::random::<f64>());
                (wait_min + spread).saturating_mul(multiplier)
            }
            Backoff::Exponential => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                wait_min.saturating_mul(factor).min(wait_max)
            }
        }
    }
}

/// Decides whether an outcome should be retried.
pub trait RetryClassifier: Clone + Send + Sync + 'static {
    /// Returns `true` if a response with this status should be retried.
    fn retry_status(&self, status: StatusCode) -> bool;

    /// Returns `true` if this error should be retried.
    ///
    /// Circuit rejections are never retried regardless of this answer.
    fn retry_error(&self, error: &HttpClientError) -> bool {
        error.is_transport()
    }
}

/// Default classifier: transport failures, 429, and 5xx other than 501.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryClassifier;

impl RetryClassifier for DefaultRetryClassifier {
    fn retry_status(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
    }
}

/// Never retry, fail immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryClassifier for NeverRetry {
    fn retry_status(&self, _status: StatusCode) -> bool {
        false
    }

    fn retry_error(&self, _error: &HttpClientError) -> bool {
        false
    }
}

/// Retries an explicit list of statuses plus transport failures.
#[derive(Debug, Clone)]
pub struct StatusRetryClassifier {
    statuses: Vec<StatusCode>,
}

impl StatusRetryClassifier {
    /// Create a classifier retrying the given statuses.
    #[must_use]
    pub fn new(statuses: Vec<StatusCode>) -> Self {
        Self { statuses }
    }

    /// Retry only on gateway-style failures.
    #[must_use]
    pub fn gateway_errors() -> Self {
        Self::new(vec![
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ])
    }
}

impl RetryClassifier for StatusRetryClassifier {
    fn retry_status(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Lower bound of the backoff wait.
    pub wait_min: Duration,
    /// Upper bound of the backoff wait.
    pub wait_max: Duration,
    /// Backoff strategy.
    pub backoff: Backoff,
    /// Emit a debug event for every retry.
    pub log_attempts: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_min: Duration::from_secs(15),
            wait_max: Duration::from_secs(30),
            backoff: Backoff::LinearJitter,
            log_attempts: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Disable retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            wait_min: Duration::ZERO,
            wait_max: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt, self.wait_min, self.wait_max)
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retry attempts.
    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.config.max_retries = max;
        self
    }

    /// Set the backoff bounds.
    #[must_use]
    pub fn wait(mut self, min: Duration, max: Duration) -> Self {
        self.config.wait_min = min;
        self.config.wait_max = max;
        self
    }

    /// Set the backoff strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Log every retry attempt at debug level.
    #[must_use]
    pub fn log_attempts(mut self, enabled: bool) -> Self {
        self.config.log_attempts = enabled;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RetryConfig {
        self.config
    }
}

/// `tower::retry::Policy` for HTTP requests.
///
/// Each call gets its own copy of the policy, so the attempt counter is
/// per request.
#[derive(Debug, Clone)]
pub struct RetryPolicy<C = DefaultRetryClassifier> {
    config: RetryConfig,
    classifier: C,
    attempt: u32,
}

impl RetryPolicy {
    /// Policy with the default classifier.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self::with_classifier(config, DefaultRetryClassifier)
    }
}

impl<C: RetryClassifier> RetryPolicy<C> {
    /// Policy with a custom classifier.
    #[must_use]
    pub fn with_classifier(config: RetryConfig, classifier: C) -> Self {
        Self {
            config,
            classifier,
            attempt: 0,
        }
    }

    /// The retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retries already scheduled by this copy of the policy.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Returns `true` if the outcome is worth another attempt.
    pub fn is_retryable<R>(&self, result: &Result<Response<R>, HttpClientError>) -> bool {
        match result {
            Ok(response) => self.classifier.retry_status(response.status()),
            Err(e) if e.is_circuit_rejection() => false,
            Err(e) => self.classifier.retry_error(e),
        }
    }
}

impl<C, B, R> Policy<Request<B>, Response<R>, HttpClientError> for RetryPolicy<C>
where
    C: RetryClassifier,
    B: Clone,
{
    type Future = tokio::time::Sleep;

    fn retry(
        &mut self,
        req: &mut Request<B>,
        result: &mut Result<Response<R>, HttpClientError>,
    ) -> Option<Self::Future> {
        if self.attempt >= self.config.max_retries || !self.is_retryable(result) {
            return None;
        }

        let delay = self.config.delay(self.attempt);
        self.attempt += 1;

        if self.config.log_attempts {
            let outcome = match result {
                Ok(response) => response.status().to_string(),
                Err(e) => e.to_string(),
            };
            debug!(
                target: "httpclient::retry",
                method = %req.method(),
                uri = %req.uri(),
                attempt = self.attempt,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                outcome = %outcome,
                "retrying request"
            );
        }

        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, req: &Request<B>) -> Option<Request<B>> {
        if self.attempt >= self.config.max_retries {
            return None;
        }
        Some(clone_request(req))
    }
}

/// Copy a request whose body can be cloned.
pub fn clone_request<B: Clone>(req: &Request<B>) -> Request<B> {
    let mut clone = Request::new(req.body().clone());
    *clone.method_mut() = req.method().clone();
    *clone.uri_mut() = req.uri().clone();
    *clone.version_mut() = req.version();
    *clone.headers_mut() = req.headers().clone();
    *clone.extensions_mut() = req.extensions().clone();
    clone
}
