// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::runtime::{Labeler, MetricSink, PathPatterns, RawPathLabeler, RequestMeta};
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::{Layer, Service};

/// Tower layer that records the duration of every completed round trip.
///
/// One observation is made per call that yields a response, whatever its
/// status. Calls that fail below HTTP are not observed.
#[derive(Clone)]
pub struct InstrumentationLayer {
    sink: Arc<dyn MetricSink>,
    name: Arc<str>,
    labeler: Arc<dyn Labeler>,
}

impl InstrumentationLayer {
    /// Record into `sink` under the service name `name`, labelling paths raw.
    pub fn new(sink: Arc<dyn MetricSink>, name: impl Into<String>) -> Self {
        Self {
            sink,
            name: Arc::from(name.into()),
            labeler: Arc::new(RawPathLabeler),
        }
    }

    /// Reduce paths through an ordered pattern table before labelling.
    #[must_use]
    pub fn with_path_patterns(self, patterns: PathPatterns) -> Self {
        self.with_labeler(patterns)
    }

    /// Use a custom labeler.
    #[must_use]
    pub fn with_labeler(mut self, labeler: impl Labeler + 'static) -> Self {
        self.labeler = Arc::new(labeler);
        self
    }

    /// Service name attached to every observation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S> Layer<S> for InstrumentationLayer {
    type Service = InstrumentedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentedService {
            inner,
            sink: self.sink.clone(),
            name: self.name.clone(),
            labeler: self.labeler.clone(),
        }
    }
}

/// Service produced by [`InstrumentationLayer`].
#[derive(Clone)]
pub struct InstrumentedService<S> {
    inner: S,
    sink: Arc<dyn MetricSink>,
    name: Arc<str>,
    labeler: Arc<dyn Labeler>,
}

impl<S, B, R> Service<Request<B>> for InstrumentedService<S>
where
    S: Service<Request<B>, Response = Response<R>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let meta = RequestMeta::from_request(&req);
        let sink = self.sink.clone();
        let name = self.name.clone();
        let labeler = self.labeler.clone();

        let start = Instant::now();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            if let Ok(response) = &result {
                let labels = labeler.labels(&name, &meta, response.status());
                sink.observe(&labels, start.elapsed());
            }
            result
        })
    }
}
