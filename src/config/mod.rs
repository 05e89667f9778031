// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration management for the composed HTTP client
//!
//! This module loads [`HttpClientConfig`] from a YAML file and converts its
//! sections into the runtime configurations used by the layers.
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `HTTPCLIENT_CONFIG` - Path to the config file
//!   (default: `<config dir>/httpclient/config.yaml`)
//! - `HTTPCLIENT_SERVICE_NAME` - Override the instrumentation service name
//! - `HTTPCLIENT_RETRY_MAX` - Override the maximum number of retries
//! - `HTTPCLIENT_BREAKER_NAME` - Override the circuit breaker name
//!
//! # Example
//!
//! ```no_run
//! use httpclient_rs::config::HttpClientConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load with environment variable overrides
//! let config = HttpClientConfig::load_with_env()?;
//!
//! println!("Breaker: {}", config.circuit_breaker.name);
//! # Ok(())
//! # }
//! ```

mod clientconfig;

pub use clientconfig::{
    CircuitBreakerSettings, HttpClientConfig, InstrumentationSettings, LoggingSettings,
    PathPatternEntry, RetrySettings, TransportSettings, ENV_HTTPCLIENT_BREAKER_NAME,
    ENV_HTTPCLIENT_CONFIG, ENV_HTTPCLIENT_RETRY_MAX, ENV_HTTPCLIENT_SERVICE_NAME,
};
