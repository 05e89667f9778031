// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tower layers for HTTP client middleware.
//!
//! Every layer wraps any service of the transport shape, so they stack in
//! any order.
//!
//! ## Available Layers
//!
//! - [`CircuitBreakerLayer`] - Short-circuits calls while a breaker is open
//! - [`InstrumentationLayer`] - Records request durations into a metric sink
//! - [`RetryLayer`] - Re-sends retryable requests with backoff
//! - [`LoggingLayer`] - Logs requests, outcomes and timing
//!
//! # Example
//!
//! ```no_run
//! use httpclient_rs::layers::{CircuitBreakerLayer, InstrumentationLayer, RetryLayer};
//! use httpclient_rs::runtime::{CircuitBreaker, RequestDurationHistogram, RetryConfig};
//! use httpclient_rs::transport::HttpTransport;
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//!
//! let histogram = Arc::new(RequestDurationHistogram::with_defaults());
//! let breaker = Arc::new(CircuitBreaker::with_defaults("users"));
//!
//! let service = ServiceBuilder::new()
//!     .layer(RetryLayer::new(RetryConfig::default()))
//!     .layer(CircuitBreakerLayer::new(breaker))
//!     .layer(InstrumentationLayer::new(histogram, "users"))
//!     .service(HttpTransport::new());
//! ```

mod circuit_breaker;
mod instrumentation;
mod logging;
mod retry;

pub use circuit_breaker::{CircuitBreakerLayer, CircuitBreakerService, FailureStatusSet};
pub use instrumentation::{InstrumentationLayer, InstrumentedService};
pub use logging::{LoggingLayer, LoggingService};
pub use retry::{RetryLayer, RetryService};
