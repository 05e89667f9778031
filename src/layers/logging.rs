// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::runtime::{LoggingConfig, RequestEvent};
use http::{Request, Response};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::{Layer, Service};

/// Tower layer that logs every request with its outcome and timing.
#[derive(Debug, Clone, Default)]
pub struct LoggingLayer {
    config: Arc<LoggingConfig>,
}

impl LoggingLayer {
    /// Create a logging layer with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer with a custom configuration.
    #[must_use]
    pub fn with_config(config: LoggingConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Service produced by [`LoggingLayer`].
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
    config: Arc<LoggingConfig>,
}

impl<S, B, R> Service<Request<B>> for LoggingService<S>
where
    S: Service<Request<B>, Response = Response<R>>,
    S::Error: fmt::Display,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let config = self.config.clone();
        let summary = RequestSummary::new(&config, &req);
        let start = Instant::now();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            let error = result.as_ref().err().map(ToString::to_string);
            let status = result.as_ref().ok().map(|response| response.status());
            let event = RequestEvent {
                method: &summary.method,
                uri: &summary.uri,
                headers: summary.headers.as_deref(),
                status: status.map(|status| status.as_u16()),
                elapsed_ms,
                error: error.as_deref(),
            };
            let level = match status {
                Some(status) if !status.is_client_error() && !status.is_server_error() => {
                    config.success_level
                }
                _ => config.error_level,
            };
            level.emit(&event);
            result
        })
    }
}

/// Request fields captured before the request is handed to the inner service.
#[derive(Debug, PartialEq, Eq)]
struct RequestSummary {
    method: String,
    uri: String,
    headers: Option<String>,
}

impl RequestSummary {
    fn new<B>(config: &LoggingConfig, req: &Request<B>) -> Self {
        let uri = req.uri();
        let target = match (config.log_query, uri.path_and_query()) {
            (true, Some(pq)) => pq.as_str(),
            _ => uri.path(),
        };
        let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
        let headers = (config.log_headers && !req.headers().is_empty())
            .then(|| config.format_headers(req.headers()));

        Self {
            method: req.method().to_string(),
            uri: format!("{authority}{target}"),
            headers,
        }
    }
}
