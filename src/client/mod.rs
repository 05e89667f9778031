// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composed HTTP client.
//!
//! [`HttpClient`] stacks the layers in their usual order, outermost first:
//!
//! ```text
//! retry -> circuit breaker -> instrumentation -> logging -> transport
//! ```
//!
//! Every retry attempt passes through the breaker and is observed by the
//! instrumentation. Each layer can be switched off in the configuration.
//!
//! # Example
//!
//! ```no_run
//! use httpclient_rs::config::HttpClientConfig;
//! use httpclient_rs::HttpClient;
//!
//! # async fn run() -> httpclient_rs::error::Result<()> {
//! let client = HttpClient::from_config(&HttpClientConfig::load_with_env()?)?;
//! let response = client.get("http://localhost:8080/user/42").await?;
//! println!("{} ({} bytes)", response.status(), response.body().len());
//!
//! if let Some(histogram) = client.histogram() {
//!     println!("{}", histogram.to_prometheus_text());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::HttpClientConfig;
use crate::error::{HttpClientError, Result};
use crate::layers::{CircuitBreakerLayer, InstrumentationLayer, LoggingLayer, RetryLayer};
use crate::runtime::{Breaker, CircuitBreaker, MetricSink, RequestDurationHistogram};
use crate::transport::{boxed, BoxTransport, HttpTransport, RequestBody, Transport};
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tower::{Layer, ServiceExt};
use url::Url;

/// HTTP client with retry, circuit breaking, instrumentation and logging.
#[derive(Clone)]
pub struct HttpClient {
    service: BoxTransport,
    breaker: Option<Arc<dyn Breaker>>,
    histogram: Option<Arc<RequestDurationHistogram>>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .field("histogram", &self.histogram.is_some())
            .finish()
    }
}

impl HttpClient {
    /// Create a client builder.
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Build a client over the default transport from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &HttpClientConfig) -> Result<Self> {
        Self::builder().config(config.clone()).build()
    }

    /// Send a request through the full stack.
    ///
    /// Responses come back whatever their status. Only failures below
    /// HTTP and circuit rejections are errors.
    pub fn send(
        &self,
        request: Request<RequestBody>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send + 'static {
        let service = self.service.clone();
        async move { service.oneshot(request).await }
    }

    /// Send a `GET` request to `url`.
    pub fn get(&self, url: &str) -> impl Future<Output = Result<Response<Bytes>>> + Send + 'static {
        self.request(Method::GET, url, Bytes::new())
    }

    /// Send a request with the given method and body to `url`.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: impl Into<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send + 'static {
        let request = build_request(method, url, body.into());
        let service = self.service.clone();
        async move { service.oneshot(request?).await }
    }

    /// The circuit breaker, when the breaker layer is installed.
    #[must_use]
    pub fn breaker(&self) -> Option<&Arc<dyn Breaker>> {
        self.breaker.as_ref()
    }

    /// The bundled histogram, when instrumentation records into it.
    #[must_use]
    pub fn histogram(&self) -> Option<&Arc<RequestDurationHistogram>> {
        self.histogram.as_ref()
    }
}

fn build_request(method: Method, url: &str, body: Bytes) -> Result<Request<RequestBody>> {
    let url = Url::parse(url)
        .map_err(|e| HttpClientError::InvalidRequest(format!("invalid URL '{}': {}", url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpClientError::InvalidRequest(format!(
            "unsupported URL scheme '{}'",
            url.scheme()
        )));
    }

    Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(Full::new(body))
        .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))
}

/// Builder for [`HttpClient`].
#[derive(Default)]
pub struct HttpClientBuilder {
    config: Option<HttpClientConfig>,
    transport: Option<BoxTransport>,
    sink: Option<Arc<dyn MetricSink>>,
    breaker: Option<Arc<dyn Breaker>>,
}

impl HttpClientBuilder {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration.
    #[must_use]
    pub fn config(mut self, config: HttpClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the base transport.
    #[must_use]
    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: Transport<RequestBody, Bytes> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(boxed(transport));
        self
    }

    /// Record request durations into this sink instead of a bundled histogram.
    #[must_use]
    pub fn metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use this breaker instead of one built from the configuration.
    #[must_use]
    pub fn breaker(mut self, breaker: Arc<dyn Breaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn build(self) -> Result<HttpClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut service = self.transport.unwrap_or_else(|| {
            boxed(HttpTransport::with_config(
                &config.transport.to_transport_config(),
            ))
        });

        if config.logging.enabled {
            let layer = LoggingLayer::with_config(config.logging.to_logging_config());
            service = boxed(layer.layer(service));
        }

        let mut histogram = None;
        if config.instrumentation.enabled {
            let sink = match self.sink {
                Some(sink) => sink,
                None => {
                    let bundled = Arc::new(RequestDurationHistogram::new(
                        config.instrumentation.histogram_config(),
                    ));
                    histogram = Some(bundled.clone());
                    bundled
                }
            };
            let layer = InstrumentationLayer::new(sink, config.instrumentation.service_name.clone())
                .with_path_patterns(config.instrumentation.path_patterns()?);
            service = boxed(layer.layer(service));
        }

        let mut breaker = None;
        if config.circuit_breaker.enabled {
            let shared: Arc<dyn Breaker> = match self.breaker {
                Some(shared) => shared,
                None => Arc::new(CircuitBreaker::new(
                    config.circuit_breaker.to_breaker_config(),
                )),
            };
            let layer = CircuitBreakerLayer::new(shared.clone())
                .with_failure_statuses(config.circuit_breaker.failure_status_set()?);
            service = boxed(layer.layer(service));
            breaker = Some(shared);
        }

        if config.retry.enabled {
            let layer = RetryLayer::new(config.retry.to_retry_config());
            service = boxed(layer.layer(service));
        }

        Ok(HttpClient {
            service,
            breaker,
            histogram,
        })
    }
}
