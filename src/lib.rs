// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composable resilience and observability middleware for HTTP clients.
//!
//! Every piece is a `tower` layer over one transport shape
//! (`Service<http::Request<B>, Response = http::Response<R>, Error = HttpClientError>`),
//! so the layers stack in any order:
//!
//! - [`layers::CircuitBreakerLayer`] stops calling a failing dependency,
//! - [`layers::InstrumentationLayer`] records request durations with
//!   bounded-cardinality labels,
//! - [`layers::RetryLayer`] re-sends retryable requests with backoff,
//! - [`layers::LoggingLayer`] logs requests and outcomes.
//!
//! [`HttpClient`] composes all of them over [`transport::HttpTransport`]
//! from an [`config::HttpClientConfig`].

pub mod client;
pub mod config;
pub mod error;
pub mod layers;
pub mod runtime;
pub mod testkit;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use error::HttpClientError;
pub use layers::{
    CircuitBreakerLayer, FailureStatusSet, InstrumentationLayer, LoggingLayer, RetryLayer,
};
pub use runtime::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, PathPatterns, RequestDurationHistogram,
    RetryConfig,
};
pub use transport::{BoxTransport, HttpTransport, Transport, TransportConfig};
