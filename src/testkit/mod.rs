// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory transports and sinks for testing middleware stacks.
//!
//! [`ScriptedTransport`] replays a scripted list of outcomes and records the
//! requests it receives. [`RecordingSink`] captures metric observations.
//!
//! ```
//! use httpclient_rs::testkit::ScriptedTransport;
//! use http::{Request, StatusCode};
//! use tower::ServiceExt;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let transport = ScriptedTransport::new()
//!     .respond(StatusCode::SERVICE_UNAVAILABLE)
//!     .respond(StatusCode::OK);
//!
//! let first = transport.clone().oneshot(Request::get("http://test/").body(String::new()).unwrap());
//! assert_eq!(first.await.unwrap().status(), StatusCode::SERVICE_UNAVAILABLE);
//! assert_eq!(transport.calls(), 1);
//! # }
//! ```

use crate::error::HttpClientError;
use crate::runtime::{LabelSet, MetricSink};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper::body::Body;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

type ErrorFactory = Arc<dyn Fn() -> HttpClientError + Send + Sync>;

#[derive(Clone)]
enum Step {
    Respond { status: StatusCode, body: Bytes },
    Fail(ErrorFactory),
}

/// A request as seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Collected request body.
    pub body: Bytes,
}

#[derive(Default)]
struct Script {
    steps: Vec<Step>,
    position: usize,
    requests: Vec<RecordedRequest>,
}

impl Script {
    /// The next step. The last step repeats once the script is used up.
    fn next_step(&mut self) -> Option<Step> {
        let step = self
            .steps
            .get(self.position)
            .or_else(|| self.steps.last())
            .cloned();
        self.position = self.position.saturating_add(1);
        step
    }
}

/// Transport that replays scripted outcomes in order.
///
/// Clones share the script and the request log. An empty script answers
/// `200 OK` with an empty body.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    latency: Duration,
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = self.lock();
        f.debug_struct("ScriptedTransport")
            .field("steps", &script.steps.len())
            .field("calls", &script.requests.len())
            .field("latency", &self.latency)
            .finish()
    }
}

impl ScriptedTransport {
    /// Create an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response with an empty body.
    #[must_use]
    pub fn respond(self, status: StatusCode) -> Self {
        self.respond_with_body(status, Bytes::new())
    }

    /// Append a response with a body.
    #[must_use]
    pub fn respond_with_body(self, status: StatusCode, body: impl Into<Bytes>) -> Self {
        self.lock().steps.push(Step::Respond {
            status,
            body: body.into(),
        });
        self
    }

    /// Append a failure. The factory runs on every call that reaches it.
    #[must_use]
    pub fn fail_with<F>(self, error: F) -> Self
    where
        F: Fn() -> HttpClientError + Send + Sync + 'static,
    {
        self.lock().steps.push(Step::Fail(Arc::new(error)));
        self
    }

    /// Delay every outcome by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B> Service<Request<B>> for ScriptedTransport
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Send,
{
    type Response = Response<Bytes>;
    type Error = HttpClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let script = self.script.clone();
        let latency = self.latency;

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();

            let step = {
                let mut script = script.lock().unwrap_or_else(PoisonError::into_inner);
                script.requests.push(RecordedRequest {
                    method: parts.method,
                    uri: parts.uri,
                    headers: parts.headers,
                    body,
                });
                script.next_step()
            };

            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            match step {
                None => Ok(Response::new(Bytes::new())),
                Some(Step::Respond { status, body }) => {
                    let mut response = Response::new(body);
                    *response.status_mut() = status;
                    Ok(response)
                }
                Some(Step::Fail(error)) => Err(error()),
            }
        })
    }
}

/// Metric sink that keeps every observation in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    observations: Mutex<Vec<(LabelSet, Duration)>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observations so far, in order.
    #[must_use]
    pub fn observations(&self) -> Vec<(LabelSet, Duration)> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MetricSink for RecordingSink {
    fn observe(&self, labels: &LabelSet, elapsed: Duration) {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((labels.clone(), elapsed));
    }
}
