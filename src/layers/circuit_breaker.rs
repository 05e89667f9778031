// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::error::{HttpClientError, Result};
use crate::runtime::{Breaker, CircuitBreaker, OutcomeGuard};
use http::{Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Ordered set of response statuses that count as breaker failures.
///
/// A response with one of these statuses is still returned to the caller
/// unchanged. Only the breaker sees it as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStatusSet {
    statuses: Vec<StatusCode>,
}

impl Default for FailureStatusSet {
    fn default() -> Self {
        Self::new([
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::NOT_IMPLEMENTED,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
            StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            StatusCode::VARIANT_ALSO_NEGOTIATES,
            StatusCode::INSUFFICIENT_STORAGE,
            StatusCode::LOOP_DETECTED,
            StatusCode::NOT_EXTENDED,
            StatusCode::NETWORK_AUTHENTICATION_REQUIRED,
        ])
    }
}

impl FailureStatusSet {
    /// Build a set from statuses, keeping the first occurrence of each.
    pub fn new(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        let mut set = Self {
            statuses: Vec::new(),
        };
        for status in statuses {
            set.insert(status);
        }
        set
    }

    /// An empty set: only transport errors count as failures.
    #[must_use]
    pub fn none() -> Self {
        Self {
            statuses: Vec::new(),
        }
    }

    /// Build a set from numeric codes.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::Config` for a code outside `100..=999`.
    pub fn from_codes(codes: &[u16]) -> Result<Self> {
        let statuses = codes
            .iter()
            .map(|&code| {
                StatusCode::from_u16(code).map_err(|_| {
                    HttpClientError::Config(format!("invalid failure status code {code}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(statuses))
    }

    /// Add a status if not already present.
    pub fn insert(&mut self, status: StatusCode) {
        if !self.contains(status) {
            self.statuses.push(status);
        }
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.insert(status);
        self
    }

    /// Returns `true` if responses with `status` count as failures.
    #[must_use]
    pub fn contains(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
    }

    /// Statuses in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = StatusCode> + '_ {
        self.statuses.iter().copied()
    }

    /// Number of statuses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Tower layer guarding the inner service with a circuit breaker.
///
/// The breaker is shared by every service this layer produces.
pub struct CircuitBreakerLayer<K: ?Sized = CircuitBreaker> {
    breaker: Arc<K>,
    failure_statuses: Arc<FailureStatusSet>,
}

impl<K: ?Sized> Clone for CircuitBreakerLayer<K> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            failure_statuses: self.failure_statuses.clone(),
        }
    }
}

impl<K: Breaker + ?Sized> CircuitBreakerLayer<K> {
    /// Guard with `breaker`, using the default failure statuses.
    pub fn new(breaker: Arc<K>) -> Self {
        Self {
            breaker,
            failure_statuses: Arc::new(FailureStatusSet::default()),
        }
    }

    /// Replace the statuses reported to the breaker as failures.
    #[must_use]
    pub fn with_failure_statuses(mut self, statuses: FailureStatusSet) -> Self {
        self.failure_statuses = Arc::new(statuses);
        self
    }

    /// The shared breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<K> {
        &self.breaker
    }

    /// The statuses reported as failures.
    #[must_use]
    pub fn failure_statuses(&self) -> &FailureStatusSet {
        &self.failure_statuses
    }
}

impl<S, K: ?Sized> Layer<S> for CircuitBreakerLayer<K> {
    type Service = CircuitBreakerService<S, K>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: self.breaker.clone(),
            failure_statuses: self.failure_statuses.clone(),
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
pub struct CircuitBreakerService<S, K: ?Sized = CircuitBreaker> {
    inner: S,
    breaker: Arc<K>,
    failure_statuses: Arc<FailureStatusSet>,
}

impl<S: Clone, K: ?Sized> Clone for CircuitBreakerService<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: self.breaker.clone(),
            failure_statuses: self.failure_statuses.clone(),
        }
    }
}

impl<S, K, B, R> Service<Request<B>> for CircuitBreakerService<S, K>
where
    S: Service<Request<B>, Response = Response<R>, Error = HttpClientError>,
    S::Future: Send + 'static,
    K: Breaker + ?Sized + 'static,
{
    type Response = S::Response;
    type Error = HttpClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let admission = match self.breaker.allow() {
            Ok(admission) => admission,
            Err(rejection) => return Box::pin(async move { Err(rejection) }),
        };

        let guard = OutcomeGuard::new(self.breaker.clone(), admission);
        let failure_statuses = self.failure_statuses.clone();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            let success = match &result {
                Ok(response) => !failure_statuses.contains(response.status()),
                Err(_) => false,
            };
            guard.report(success);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CircuitBreakerConfig, CircuitState};
    use crate::testkit::ScriptedTransport;
    use std::time::Duration;
    use tower::ServiceExt;

    fn get() -> Request<String> {
        Request::get("http://api.local/user/1")
            .body(String::new())
            .unwrap()
    }

    fn lenient_breaker(consecutive: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::named("users")
                .with_failure_ratio(1.1)
                .with_consecutive_failures(consecutive)
                .with_interval(Duration::ZERO)
                .with_timeout(Duration::from_secs(45)),
        ))
    }

    #[test]
    fn test_default_failure_statuses() {
        let set = FailureStatusSet::default();
        let codes: Vec<u16> = set.iter().map(|s| s.as_u16()).collect();
        assert_eq!(
            codes,
            vec![500, 501, 502, 503, 504, 505, 506, 507, 508, 510, 511]
        );
        assert!(!set.contains(StatusCode::from_u16(509).unwrap()));
        assert!(!set.contains(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_failure_status_set_from_codes() {
        let set = FailureStatusSet::from_codes(&[503, 429, 503]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(StatusCode::TOO_MANY_REQUESTS));

        assert!(matches!(
            FailureStatusSet::from_codes(&[42]),
            Err(HttpClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_status_passes_response_through() {
        let breaker = lenient_breaker(100);
        let transport = ScriptedTransport::new().respond(StatusCode::SERVICE_UNAVAILABLE);

        let service = CircuitBreakerLayer::new(breaker.clone()).layer(transport);
        let response = service.oneshot(get()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let counts = breaker.counts();
        assert_eq!(counts.total_failures, 1);
        assert_eq!(counts.total_successes, 0);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_inner() {
        let breaker = lenient_breaker(100);
        breaker.trip();
        let transport = ScriptedTransport::new().respond(StatusCode::OK);

        let service = CircuitBreakerLayer::new(breaker).layer(transport.clone());
        let result = service.oneshot(get()).await;

        assert!(matches!(result, Err(HttpClientError::CircuitOpen { ref name }) if name == "users"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_trips_after_consecutive_failure_statuses() {
        let breaker = lenient_breaker(5);
        let transport = ScriptedTransport::new().respond(StatusCode::INTERNAL_SERVER_ERROR);
        let layer = CircuitBreakerLayer::new(breaker.clone());

        for _ in 0..5 {
            let response = layer.layer(transport.clone()).oneshot(get()).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = layer.layer(transport.clone()).oneshot(get()).await;
        assert!(result.unwrap_err().is_circuit_rejection());
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test]
    async fn test_custom_failure_statuses() {
        let breaker = lenient_breaker(100);
        let transport = ScriptedTransport::new()
            .respond(StatusCode::INTERNAL_SERVER_ERROR)
            .respond(StatusCode::TOO_MANY_REQUESTS);
        let layer = CircuitBreakerLayer::new(breaker.clone())
            .with_failure_statuses(FailureStatusSet::none().with_status(StatusCode::TOO_MANY_REQUESTS));

        layer.layer(transport.clone()).oneshot(get()).await.unwrap();
        layer.layer(transport.clone()).oneshot(get()).await.unwrap();

        let counts = breaker.counts();
        assert_eq!(counts.total_successes, 1);
        assert_eq!(counts.total_failures, 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_failure() {
        let breaker = lenient_breaker(100);
        let transport =
            ScriptedTransport::new().fail_with(|| HttpClientError::transport("connection reset"));

        let service = CircuitBreakerLayer::new(breaker.clone()).layer(transport);
        let result = service.oneshot(get()).await;

        assert!(matches!(result, Err(HttpClientError::Transport(_))));
        assert_eq!(breaker.counts().total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_reports_failure() {
        let breaker = lenient_breaker(100);
        let transport = ScriptedTransport::new()
            .with_latency(Duration::from_secs(10))
            .respond(StatusCode::OK);

        let service = CircuitBreakerLayer::new(breaker.clone()).layer(transport);
        let call = service.oneshot(get());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), call).await;

        assert!(timed_out.is_err());
        let counts = breaker.counts();
        assert_eq!(counts.requests, 1);
        assert_eq!(counts.total_failures, 1);
    }

    #[tokio::test]
    async fn test_dyn_breaker() {
        let breaker: Arc<dyn Breaker> = lenient_breaker(100);
        let transport = ScriptedTransport::new().respond(StatusCode::OK);

        let service = CircuitBreakerLayer::new(breaker.clone()).layer(transport);
        let response = service.oneshot(get()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
