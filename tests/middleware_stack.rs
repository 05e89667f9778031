// SPDX-License-Identifier: MIT OR Apache-2.0

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use httpclient_rs::config::{HttpClientConfig, PathPatternEntry};
use httpclient_rs::layers::{
    CircuitBreakerLayer, FailureStatusSet, InstrumentationLayer, RetryLayer,
};
use httpclient_rs::runtime::{
    Breaker, CircuitBreaker, CircuitBreakerConfig, CircuitState, PathPatterns, RetryConfig,
};
use httpclient_rs::testkit::{RecordingSink, ScriptedTransport};
use httpclient_rs::{HttpClient, HttpClientError, HttpTransport};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::{Layer, ServiceBuilder, ServiceExt};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// `/status/<code>` answers with that code, everything else with 200 and the
/// path as body.
fn route(req: &Request<Incoming>) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();
    let status = path
        .strip_prefix("/status/")
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let mut response = Response::new(Full::new(Bytes::from(path)));
    *response.status_mut() = status;
    response
}

struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let response = route(&req);
                        async move { Ok::<_, Infallible>(response) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, hits }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn request(&self, path: &str) -> Request<Full<Bytes>> {
        Request::get(self.url(path))
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn user_patterns(subservice_first: bool) -> PathPatterns {
    let subservice = (r"/user/\d+/subservice", "/user/{id}/subservice");
    let user = (r"/user/\d+", "/user/{id}");
    let pairs = if subservice_first {
        [subservice, user]
    } else {
        [user, subservice]
    };
    PathPatterns::try_from_pairs(pairs).unwrap()
}

fn failure_set() -> FailureStatusSet {
    FailureStatusSet::from_codes(&[500, 502, 503]).unwrap()
}

fn lenient_breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::named("users")
            .with_failure_ratio(1.1)
            .with_interval(Duration::ZERO),
    ))
}

#[tokio::test]
async fn test_path_reduction_depends_on_rule_order() {
    init_tracing();
    let server = TestServer::start().await;

    for (subservice_first, expected) in [(true, "/user/{id}/subservice"), (false, "/user/{id}")] {
        let sink = Arc::new(RecordingSink::new());
        let service = InstrumentationLayer::new(sink.clone(), "users")
            .with_path_patterns(user_patterns(subservice_first))
            .layer(HttpTransport::new());

        let response = service
            .oneshot(server.request("/user/123/subservice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let observations = sink.observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].0.path, expected);
    }
}

#[tokio::test]
async fn test_instrumentation_labels_come_from_request_and_response() {
    init_tracing();
    let server = TestServer::start().await;
    let sink = Arc::new(RecordingSink::new());

    let service = InstrumentationLayer::new(sink.clone(), "users")
        .with_path_patterns(user_patterns(true))
        .layer(HttpTransport::new());
    let response = service.oneshot(server.request("/status/418")).await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    let observations = sink.observations();
    assert_eq!(observations.len(), 1);
    let labels = &observations[0].0;
    assert_eq!(labels.name, "users");
    assert_eq!(labels.scheme, "http");
    assert_eq!(labels.host, server.addr.to_string());
    assert_eq!(labels.path, "/status/418");
    assert_eq!(labels.method, "GET");
    assert_eq!(labels.code, "418");
}

#[tokio::test]
async fn test_transport_failure_is_not_observed() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = Arc::new(RecordingSink::new());
    let service = InstrumentationLayer::new(sink.clone(), "users").layer(HttpTransport::new());
    let request = Request::get(format!("http://{addr}/user/1"))
        .body(Full::new(Bytes::new()))
        .unwrap();

    let result = service.oneshot(request).await;
    assert!(matches!(result, Err(HttpClientError::Transport(_))));
    assert!(sink.observations().is_empty());
}

#[tokio::test]
async fn test_failure_status_counts_without_error() {
    init_tracing();
    let server = TestServer::start().await;
    let breaker = lenient_breaker();

    let service = CircuitBreakerLayer::new(breaker.clone())
        .with_failure_statuses(failure_set())
        .layer(HttpTransport::new());
    let response = service.oneshot(server.request("/status/503")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body(), "/status/503");
    assert_eq!(breaker.counts().total_failures, 1);
}

#[tokio::test]
async fn test_other_status_passes_untouched() {
    init_tracing();
    let server = TestServer::start().await;
    let breaker = lenient_breaker();

    let service = CircuitBreakerLayer::new(breaker.clone())
        .with_failure_statuses(failure_set())
        .layer(HttpTransport::new());
    let response = service.oneshot(server.request("/status/404")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.body(), "/status/404");
    let counts = breaker.counts();
    assert_eq!(counts.total_failures, 0);
    assert_eq!(counts.total_successes, 1);
}

#[tokio::test]
async fn test_open_breaker_short_circuits() {
    init_tracing();
    let server = TestServer::start().await;
    let breaker = lenient_breaker();
    breaker.trip();

    let service = CircuitBreakerLayer::new(breaker.clone()).layer(HttpTransport::new());
    let result = service.oneshot(server.request("/user/1")).await;

    let error = result.unwrap_err();
    assert!(error.is_circuit_rejection());
    assert!(matches!(error, HttpClientError::CircuitOpen { ref name } if name == "users"));
    assert_eq!(server.hits(), 0);
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_three_retries() {
    let transport =
        ScriptedTransport::new().fail_with(|| HttpClientError::transport("connection refused"));
    let config = RetryConfig::builder()
        .max_retries(3)
        .wait(Duration::from_secs(15), Duration::from_secs(30))
        .build();

    let start = tokio::time::Instant::now();
    let service = RetryLayer::new(config).layer(transport.clone());
    let result = service
        .oneshot(Request::get("http://api.local/user/1").body(String::new()).unwrap())
        .await;

    assert!(matches!(result, Err(HttpClientError::Transport(_))));
    // The first attempt plus three retries.
    assert_eq!(transport.calls(), 4);
    // Linear jitter waits at least wait_min times the attempt number.
    assert!(start.elapsed() >= Duration::from_secs(15 + 30 + 45));
}

#[tokio::test]
async fn test_layers_stack_in_any_order() {
    init_tracing();
    let server = TestServer::start().await;
    let sink = Arc::new(RecordingSink::new());
    let breaker = lenient_breaker();
    let retry = RetryConfig::builder()
        .max_retries(2)
        .wait(Duration::from_millis(1), Duration::from_millis(2))
        .build();

    // Instrumentation outside retry sees one logical call.
    let service = ServiceBuilder::new()
        .layer(InstrumentationLayer::new(sink.clone(), "users"))
        .layer(RetryLayer::new(retry))
        .layer(CircuitBreakerLayer::new(breaker.clone()).with_failure_statuses(failure_set()))
        .service(HttpTransport::new());

    let response = service.oneshot(server.request("/status/502")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(server.hits(), 3);
    assert_eq!(sink.observations().len(), 1);
    assert_eq!(breaker.counts().total_failures, 3);
}

#[tokio::test]
async fn test_composed_client_end_to_end() {
    init_tracing();
    let server = TestServer::start().await;

    let mut config = HttpClientConfig::default();
    config.retry.max_retries = 3;
    config.retry.wait_min = Duration::from_millis(1);
    config.retry.wait_max = Duration::from_millis(2);
    config.retry.log_attempts = true;
    config.circuit_breaker.name = "status-api".to_string();
    config.circuit_breaker.failure_statuses = vec![500];
    config.instrumentation.service_name = "status-api".to_string();
    config.instrumentation.path_patterns = vec![PathPatternEntry {
        pattern: r"/status/\d+".to_string(),
        label: "/status/{code}".to_string(),
    }];
    config.logging.enabled = true;

    let client = HttpClient::from_config(&config).unwrap();

    let response = client.get(&server.url("/status/502")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(server.hits(), 4);

    let ok = client.get(&server.url("/user/5")).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(ok.body(), "/user/5");

    let histogram = client.histogram().unwrap();
    assert_eq!(histogram.total_count(), 5);

    let text = histogram.to_prometheus_text();
    assert!(text.contains("outgoing_http_request_duration_seconds_bucket"));
    assert!(text.contains(r#"path="/status/{code}""#));
    assert!(text.contains(r#"code="502""#));

    let breaker = client.breaker().unwrap();
    assert_eq!(breaker.name(), "status-api");
    assert_eq!(breaker.state(), CircuitState::Closed);
}
