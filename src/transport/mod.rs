// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transport abstraction every layer wraps, and the base network
//! transport.
//!
//! A transport is any `tower::Service` that turns one `http::Request<B>`
//! into one `http::Response<R>` or an [`HttpClientError`]. Layers accept and
//! produce that shape, so they compose in any order.

use crate::error::HttpClientError;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::Service;

/// Request body used by [`HttpTransport`].
pub type RequestBody = Full<Bytes>;

/// Type-erased transport with the body types of [`HttpTransport`].
///
/// It is `Clone + Send + Sync`, so a stack built on it can be shared across tasks.
pub type BoxTransport =
    BoxCloneSyncService<Request<RequestBody>, Response<Bytes>, HttpClientError>;

/// Anything that sends one request and yields one response or failure.
pub trait Transport<B, R>:
    Service<Request<B>, Response = Response<R>, Error = HttpClientError>
{
}

impl<T, B, R> Transport<B, R> for T where
    T: Service<Request<B>, Response = Response<R>, Error = HttpClientError>
{
}

/// Erase the type of a transport stack.
pub fn boxed<S>(service: S) -> BoxTransport
where
    S: Transport<RequestBody, Bytes> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// Settings for the base network transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Deadline for one round trip, including reading the body.
    pub timeout: Duration,
    /// How long idle pooled connections are kept. `None` keeps them forever.
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Create a new transport configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pool idle timeout.
    #[must_use]
    pub fn with_pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn with_pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }
}

/// Base transport on a pooled hyper client.
///
/// The response body is read fully before the response is returned, so
/// the timeout covers the whole round trip. Any hyper-util connector can be
/// plugged in with [`HttpTransport::with_connector`].
pub struct HttpTransport<C = HttpConnector> {
    client: Client<C, RequestBody>,
    timeout: Duration,
}

impl<C: Clone> Clone for HttpTransport<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            timeout: self.timeout,
        }
    }
}

impl HttpTransport {
    /// Plain HTTP transport with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&TransportConfig::default())
    }

    /// Plain HTTP transport with custom settings.
    #[must_use]
    pub fn with_config(config: &TransportConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout));
        Self::with_connector(connector, config)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HttpTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Transport over a custom connector.
    pub fn with_connector(connector: C, config: &TransportConfig) -> Self {
        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle) = config.pool_idle_timeout {
            builder.pool_idle_timeout(idle);
        }

        Self {
            client: builder.build(connector),
            timeout: config.timeout,
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<C> Service<Request<RequestBody>> for HttpTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    type Response = Response<Bytes>;
    type Error = HttpClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<RequestBody>) -> Self::Future {
        let client = self.client.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let round_trip = async move {
                let response = client.request(req).await.map_err(HttpClientError::transport)?;
                let (parts, body) = response.into_parts();
                let body = body
                    .collect()
                    .await
                    .map_err(HttpClientError::transport)?
                    .to_bytes();
                Ok::<_, HttpClientError>(Response::from_parts(parts, body))
            };

            match tokio::time::timeout(timeout, round_trip).await {
                Ok(result) => result,
                Err(_) => Err(HttpClientError::Timeout(timeout)),
            }
        })
    }
}
