// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities for resilience and observability.
//!
//! This module provides the engines behind the middleware layers: the
//! circuit breaker state machine, retry policies, the request-duration
//! histogram, path-pattern reduction and request logging configuration.

mod circuit_breaker;
mod logging;
mod metrics;
mod path_pattern;
mod retry;

pub use circuit_breaker::{
    Admission, Breaker, CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts, ReadyToTrip,
    StateChangeHook,
};
pub use logging::{LogLevel, LoggingConfig};
pub(crate) use circuit_breaker::OutcomeGuard;
pub(crate) use logging::RequestEvent;
pub use metrics::{
    HistogramConfig, HistogramConfigBuilder, LabelSet, Labeler, MetricSink, RawPathLabeler,
    RequestDurationHistogram, RequestMeta, DEFAULT_BUCKETS, DEFAULT_HISTOGRAM_NAME,
};
pub use path_pattern::PathPatterns;
pub use retry::{
    clone_request, Backoff, DefaultRetryClassifier, NeverRetry, RetryClassifier, RetryConfig,
    RetryConfigBuilder, RetryPolicy, StatusRetryClassifier,
};
