// SPDX-License-Identifier: MIT OR Apache-2.0

//! Example: Resilient HTTP Client
//!
//! Walks through the middleware pieces and then composes them:
//! - Path pattern reduction for metric labels
//! - Circuit breaker state machine
//! - Retry backoff
//! - A fully composed client built from YAML configuration
//!
//! Pass a URL as the first argument to send a real request through the stack.

use httpclient_rs::config::HttpClientConfig;
use httpclient_rs::runtime::{Backoff, Breaker};
use httpclient_rs::testkit::ScriptedTransport;
use httpclient_rs::{
    CircuitBreaker, CircuitBreakerConfig, HttpClient, HttpClientError, PathPatterns, RetryConfig,
};
use std::time::Duration;

const CONFIG: &str = r#"
retry:
  max_retries: 2
  wait_min: 100ms
  wait_max: 1s
circuit_breaker:
  name: demo-api
  failure_statuses: [500]
instrumentation:
  service_name: demo-api
  path_patterns:
    - pattern: '/user/\d+/subservice'
      label: '/user/{id}/subservice'
    - pattern: '/user/\d+'
      label: '/user/{id}'
logging:
  enabled: true
  log_headers: true
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // ==========================================================================
    // 1. Path Pattern Reduction
    // ==========================================================================
    println!("=== Path Pattern Reduction ===");

    let patterns = PathPatterns::try_from_pairs([
        (r"/user/\d+/subservice", "/user/{id}/subservice"),
        (r"/user/\d+", "/user/{id}"),
    ])?;
    for path in ["/user/123/subservice", "/user/42", "/health"] {
        println!("  {path} -> {}", patterns.reduce(path));
    }

    // ==========================================================================
    // 2. Circuit Breaker
    // ==========================================================================
    println!("\n=== Circuit Breaker ===");

    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::named("inventory")
            .with_ready_to_trip(|counts| counts.consecutive_failures >= 3)
            .with_timeout(Duration::from_secs(10))
            .with_on_state_change(|name, from, to| {
                println!("  breaker '{name}': {from} -> {to}");
            }),
    );

    for i in 1..=4 {
        let result = breaker
            .execute(|| async move {
                Err::<(), _>(HttpClientError::transport(format!("attempt {i} refused")))
            })
            .await;
        println!("  call {i}: {result:?}");
    }
    println!("State: {}", breaker.state());
    println!("Counts: {:?}", breaker.counts());
    println!("Half-open in: {:?}", breaker.time_until_half_open());

    // ==========================================================================
    // 3. Retry Backoff
    // ==========================================================================
    println!("\n=== Retry Backoff ===");

    let retry = RetryConfig::builder()
        .max_retries(4)
        .wait(Duration::from_millis(100), Duration::from_secs(2))
        .backoff(Backoff::Exponential)
        .build();
    for attempt in 0..retry.max_retries {
        println!("  retry {}: wait {:?}", attempt + 1, retry.delay(attempt));
    }

    // ==========================================================================
    // 4. Composed Client over a Scripted Transport
    // ==========================================================================
    println!("\n=== Composed Client ===");

    let config = HttpClientConfig::from_yaml(CONFIG)?;
    let scripted = ScriptedTransport::new()
        .respond(http::StatusCode::SERVICE_UNAVAILABLE)
        .respond_with_body(http::StatusCode::OK, "hello");
    let client = HttpClient::builder()
        .config(config.clone())
        .transport(scripted.clone())
        .build()?;

    let response = client.get("http://demo.local/user/7").await?;
    println!(
        "  status {} after {} transport calls",
        response.status(),
        scripted.calls()
    );
    if let Some(histogram) = client.histogram() {
        print!("{}", histogram.to_prometheus_text());
    }

    // ==========================================================================
    // 5. Real Request
    // ==========================================================================
    if let Some(url) = std::env::args().nth(1) {
        println!("\n=== Real Request ===");

        let client = HttpClient::from_config(&config)?;
        match client.get(&url).await {
            Ok(response) => println!("  {} ({} bytes)", response.status(), response.body().len()),
            Err(e) => println!("  request failed: {e}"),
        }
        if let Some(breaker) = client.breaker() {
            println!("  breaker '{}' is {}", breaker.name(), breaker.state());
        }
    }

    Ok(())
}
