// SPDX-License-Identifier: MIT OR Apache-2.0

//! YAML configuration file for the composed HTTP client.
//!
//! Every section and field is optional; missing values take the library
//! defaults. Durations use humantime notation (`15s`, `1m 30s`).
//!
//! ```yaml
//! retry:
//!   max_retries: 3
//!   wait_min: 15s
//!   wait_max: 30s
//!   backoff: linear_jitter
//! circuit_breaker:
//!   name: users-api
//!   timeout: 45s
//!   failure_statuses: [500, 502, 503]
//! instrumentation:
//!   service_name: users-api
//!   path_patterns:
//!     - pattern: '/user/\d+/orders'
//!       label: '/user/{id}/orders'
//!     - pattern: '/user/\d+'
//!       label: '/user/{id}'
//! transport:
//!   timeout: 30s
//! logging:
//!   enabled: true
//!   success_level: debug
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HttpClientError, Result};
use crate::layers::FailureStatusSet;
use crate::runtime::{
    Backoff, CircuitBreakerConfig, HistogramConfig, LogLevel, LoggingConfig, PathPatterns,
    RetryConfig, DEFAULT_BUCKETS, DEFAULT_HISTOGRAM_NAME,
};
use crate::transport::TransportConfig;

/// Path to the configuration file.
pub const ENV_HTTPCLIENT_CONFIG: &str = "HTTPCLIENT_CONFIG";
/// Overrides `instrumentation.service_name`.
pub const ENV_HTTPCLIENT_SERVICE_NAME: &str = "HTTPCLIENT_SERVICE_NAME";
/// Overrides `retry.max_retries`.
pub const ENV_HTTPCLIENT_RETRY_MAX: &str = "HTTPCLIENT_RETRY_MAX";
/// Overrides `circuit_breaker.name`.
pub const ENV_HTTPCLIENT_BREAKER_NAME: &str = "HTTPCLIENT_BREAKER_NAME";

/// Represents the entire configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpClientConfig {
    /// Retry layer settings.
    pub retry: RetrySettings,
    /// Circuit breaker layer settings.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Instrumentation layer settings.
    pub instrumentation: InstrumentationSettings,
    /// Base transport settings.
    pub transport: TransportSettings,
    /// Logging layer settings.
    pub logging: LoggingSettings,
}

/// `retry` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Whether the retry layer is installed.
    pub enabled: bool,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Lower backoff bound.
    #[serde(with = "humantime_serde")]
    pub wait_min: Duration,
    /// Upper backoff bound.
    #[serde(with = "humantime_serde")]
    pub wait_max: Duration,
    /// Backoff strategy.
    pub backoff: Backoff,
    /// Log every retry at debug level.
    pub log_attempts: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            enabled: true,
            max_retries: defaults.max_retries,
            wait_min: defaults.wait_min,
            wait_max: defaults.wait_max,
            backoff: defaults.backoff,
            log_attempts: defaults.log_attempts,
        }
    }
}

impl RetrySettings {
    /// Runtime retry configuration.
    #[must_use]
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::builder()
            .max_retries(self.max_retries)
            .wait(self.wait_min, self.wait_max)
            .backoff(self.backoff)
            .log_attempts(self.log_attempts)
            .build()
    }
}

/// `circuit_breaker` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    /// Whether the circuit breaker layer is installed.
    pub enabled: bool,
    /// Breaker name.
    pub name: String,
    /// Half-open request quota.
    pub max_requests: u32,
    /// Rolling window for closed-state counts.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Open-state timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Trip when the failure ratio reaches this value.
    pub failure_ratio: f64,
    /// Trip after this many failures in a row.
    pub consecutive_failures: u32,
    /// Response statuses counted as failures.
    pub failure_statuses: Vec<u16>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            enabled: true,
            name: defaults.name,
            max_requests: defaults.max_requests,
            interval: defaults.interval,
            timeout: defaults.timeout,
            failure_ratio: defaults.failure_ratio,
            consecutive_failures: defaults.consecutive_failures,
            failure_statuses: FailureStatusSet::default()
                .iter()
                .map(|s| s.as_u16())
                .collect(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Runtime breaker configuration.
    #[must_use]
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::named(self.name.clone())
            .with_max_requests(self.max_requests)
            .with_interval(self.interval)
            .with_timeout(self.timeout)
            .with_failure_ratio(self.failure_ratio)
            .with_consecutive_failures(self.consecutive_failures)
    }

    /// Failure statuses as a set.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::Config` for an invalid status code.
    pub fn failure_status_set(&self) -> Result<FailureStatusSet> {
        FailureStatusSet::from_codes(&self.failure_statuses)
    }
}

/// One entry of `instrumentation.path_patterns`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PathPatternEntry {
    /// Regular expression matched anywhere in the path.
    pub pattern: String,
    /// Label used when the pattern matches.
    pub label: String,
}

/// `instrumentation` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InstrumentationSettings {
    /// Whether the instrumentation layer is installed.
    pub enabled: bool,
    /// Value of the `name` label.
    pub service_name: String,
    /// Histogram metric name.
    pub histogram_name: String,
    /// Histogram bucket bounds in seconds.
    pub buckets: Vec<f64>,
    /// Ordered path reduction rules, first match wins.
    pub path_patterns: Vec<PathPatternEntry>,
}

impl Default for InstrumentationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "default".to_string(),
            histogram_name: DEFAULT_HISTOGRAM_NAME.to_string(),
            buckets: DEFAULT_BUCKETS.to_vec(),
            path_patterns: Vec::new(),
        }
    }
}

impl InstrumentationSettings {
    /// Compile the path reduction rules.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::InvalidPattern` for a malformed pattern.
    pub fn path_patterns(&self) -> Result<PathPatterns> {
        PathPatterns::try_from_pairs(
            self.path_patterns
                .iter()
                .map(|entry| (entry.pattern.as_str(), entry.label.as_str())),
        )
    }

    /// Histogram configuration.
    #[must_use]
    pub fn histogram_config(&self) -> HistogramConfig {
        HistogramConfig::builder()
            .name(self.histogram_name.clone())
            .buckets(self.buckets.clone())
            .build()
    }
}

/// `transport` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    /// Deadline for one round trip.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Idle timeout of pooled connections.
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let defaults = TransportConfig::default();
        Self {
            timeout: defaults.timeout,
            pool_idle_timeout: defaults.pool_idle_timeout,
            pool_max_idle_per_host: defaults.pool_max_idle_per_host,
        }
    }
}

impl TransportSettings {
    /// Runtime transport configuration.
    #[must_use]
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig::new()
            .with_timeout(self.timeout)
            .with_pool_idle_timeout(self.pool_idle_timeout)
            .with_pool_max_idle_per_host(self.pool_max_idle_per_host)
    }
}

/// `logging` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Whether the logging layer is installed.
    pub enabled: bool,
    /// Level for successful responses.
    pub success_level: LogLevel,
    /// Level for error responses and failures.
    pub error_level: LogLevel,
    /// Log request headers.
    pub log_headers: bool,
    /// Log query strings.
    pub log_query: bool,
    /// Extra headers to redact, on top of the built-in list.
    pub sensitive_headers: Vec<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        let defaults = LoggingConfig::default();
        Self {
            enabled: false,
            success_level: defaults.success_level,
            error_level: defaults.error_level,
            log_headers: defaults.log_headers,
            log_query: defaults.log_query,
            sensitive_headers: Vec::new(),
        }
    }
}

impl LoggingSettings {
    /// Runtime logging configuration.
    #[must_use]
    pub fn to_logging_config(&self) -> LoggingConfig {
        self.sensitive_headers.iter().fold(
            LoggingConfig::new()
                .with_success_level(self.success_level)
                .with_error_level(self.error_level)
                .with_headers(self.log_headers)
                .with_query(self.log_query),
            |config, header| config.with_sensitive_header(header.clone()),
        )
    }
}

impl HttpClientConfig {
    /// Load configuration from the default location
    /// (`<config dir>/httpclient/config.yaml`).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config directory cannot be determined
    /// - The config file cannot be read
    /// - The config file is malformed
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed YAML.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            HttpClientError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| HttpClientError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| HttpClientError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Get the default config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            HttpClientError::Config("Could not determine config directory".to_string())
        })?;

        Ok(dir.join("httpclient").join("config.yaml"))
    }

    /// Get the path to the config file, respecting `HTTPCLIENT_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined when
    /// `HTTPCLIENT_CONFIG` is not set.
    pub fn config_path() -> Result<PathBuf> {
        match std::env::var(ENV_HTTPCLIENT_CONFIG) {
            Ok(env_path) => Ok(PathBuf::from(env_path)),
            Err(_) => Self::default_path(),
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// A missing file at the default location yields the defaults. A file
    /// named by `HTTPCLIENT_CONFIG` must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override
    /// is malformed, or validation fails.
    pub fn load_with_env() -> Result<Self> {
        let explicit = std::env::var_os(ENV_HTTPCLIENT_CONFIG).is_some();
        let path = Self::config_path()?;

        let mut config = if explicit || path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply single-field overrides looked up by environment variable name.
    ///
    /// # Errors
    ///
    /// Returns an error if `HTTPCLIENT_RETRY_MAX` is not a number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_HTTPCLIENT_SERVICE_NAME) {
            self.instrumentation.service_name = name;
        }
        if let Some(name) = lookup(ENV_HTTPCLIENT_BREAKER_NAME) {
            self.circuit_breaker.name = name;
        }
        if let Some(max) = lookup(ENV_HTTPCLIENT_RETRY_MAX) {
            self.retry.max_retries = max.trim().parse().map_err(|e| {
                HttpClientError::Config(format!(
                    "Invalid {}={}: {}",
                    ENV_HTTPCLIENT_RETRY_MAX, max, e
                ))
            })?;
        }
        Ok(())
    }

    /// Check the configuration for values the layers cannot work with.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if retry.wait_min > retry.wait_max {
            return Err(HttpClientError::Config(format!(
                "retry.wait_min ({:?}) exceeds retry.wait_max ({:?})",
                retry.wait_min, retry.wait_max
            )));
        }

        let breaker = &self.circuit_breaker;
        if breaker.name.trim().is_empty() {
            return Err(HttpClientError::Config(
                "circuit_breaker.name must not be empty".to_string(),
            ));
        }
        if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
            return Err(HttpClientError::Config(format!(
                "circuit_breaker.failure_ratio must be in (0, 1], got {}",
                breaker.failure_ratio
            )));
        }
        breaker.failure_status_set()?;

        let instrumentation = &self.instrumentation;
        if instrumentation.service_name.trim().is_empty() {
            return Err(HttpClientError::Config(
                "instrumentation.service_name must not be empty".to_string(),
            ));
        }
        let buckets = &instrumentation.buckets;
        if buckets.is_empty() {
            return Err(HttpClientError::Config(
                "instrumentation.buckets must not be empty".to_string(),
            ));
        }
        if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0)
            || buckets.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(HttpClientError::Config(
                "instrumentation.buckets must be positive and strictly ascending".to_string(),
            ));
        }
        instrumentation.path_patterns()?;

        if self.transport.timeout.is_zero() {
            return Err(HttpClientError::Config(
                "transport.timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
retry:
  max_retries: 5
  wait_min: 100ms
  wait_max: 2s
  backoff: exponential
  log_attempts: true
circuit_breaker:
  name: users-api
  max_requests: 3
  interval: 10s
  timeout: 1m
  failure_statuses: [502, 503]
instrumentation:
  service_name: users-api
  buckets: [0.1, 0.5, 1.0]
  path_patterns:
    - pattern: '/user/\d+/subservice'
      label: '/user/{id}/subservice'
    - pattern: '/user/\d+'
      label: '/user/{id}'
transport:
  timeout: 5s
  pool_idle_timeout: 30s
logging:
  enabled: true
  success_level: debug
  sensitive_headers: [x-session]
"#;

    #[test]
    fn test_parse_full_config() {
        let config = HttpClientConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.wait_min, Duration::from_millis(100));
        assert_eq!(config.retry.backoff, Backoff::Exponential);
        assert!(config.retry.log_attempts);

        assert_eq!(config.circuit_breaker.name, "users-api");
        assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.failure_statuses, vec![502, 503]);
        // Unspecified fields keep their defaults.
        assert_eq!(config.circuit_breaker.consecutive_failures, 100);

        assert_eq!(config.instrumentation.path_patterns.len(), 2);
        assert_eq!(config.transport.timeout, Duration::from_secs(5));
        assert_eq!(
            config.transport.pool_idle_timeout,
            Some(Duration::from_secs(30))
        );
        assert!(config.logging.enabled);
        assert_eq!(config.logging.success_level, LogLevel::Debug);

        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = HttpClientConfig::from_yaml("{}").unwrap();
        assert_eq!(config, HttpClientConfig::default());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.wait_min, Duration::from_secs(15));
        assert_eq!(config.retry.wait_max, Duration::from_secs(30));
        assert_eq!(config.circuit_breaker.max_requests, 15);
        assert_eq!(config.circuit_breaker.interval, Duration::from_secs(5));
        assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(45));
        assert_eq!(config.instrumentation.buckets, vec![0.5, 1.0, 15.0, 30.0, 60.0]);
        assert_eq!(config.transport.timeout, Duration::from_secs(30));
        assert!(!config.logging.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_pattern_order_is_preserved() {
        let config = HttpClientConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        let patterns = config.instrumentation.path_patterns().unwrap();
        assert_eq!(patterns.reduce("/user/7/subservice"), "/user/{id}/subservice");
        assert_eq!(patterns.reduce("/user/7"), "/user/{id}");
    }

    #[test]
    fn test_runtime_conversions() {
        let config = HttpClientConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.wait_max, Duration::from_secs(2));

        let breaker = config.circuit_breaker.to_breaker_config();
        assert_eq!(breaker.name, "users-api");
        assert_eq!(breaker.max_requests, 3);

        let statuses = config.circuit_breaker.failure_status_set().unwrap();
        assert_eq!(statuses.len(), 2);

        let histogram = config.instrumentation.histogram_config();
        assert_eq!(histogram.buckets, vec![0.1, 0.5, 1.0]);
        assert_eq!(histogram.name, DEFAULT_HISTOGRAM_NAME);

        let logging = config.logging.to_logging_config();
        assert!(logging.is_sensitive("x-session"));
        assert!(logging.is_sensitive("authorization"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = HttpClientConfig::from_yaml("retry:\n  max_retry: 3\n");
        assert!(matches!(result, Err(HttpClientError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HttpClientConfig::default();
        config.retry.wait_min = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = HttpClientConfig::default();
        config.circuit_breaker.failure_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = HttpClientConfig::default();
        config.circuit_breaker.failure_statuses = vec![1000];
        assert!(config.validate().is_err());

        let mut config = HttpClientConfig::default();
        config.instrumentation.buckets = vec![1.0, 0.5];
        assert!(config.validate().is_err());

        let mut config = HttpClientConfig::default();
        config.instrumentation.path_patterns.push(PathPatternEntry {
            pattern: "/user/(".to_string(),
            label: "broken".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(HttpClientError::InvalidPattern { .. })
        ));

        let mut config = HttpClientConfig::default();
        config.transport.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_HTTPCLIENT_SERVICE_NAME, "orders"),
            (ENV_HTTPCLIENT_BREAKER_NAME, "orders-breaker"),
            (ENV_HTTPCLIENT_RETRY_MAX, " 7 "),
        ]
        .into_iter()
        .collect();

        let mut config = HttpClientConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.instrumentation.service_name, "orders");
        assert_eq!(config.circuit_breaker.name, "orders-breaker");
        assert_eq!(config.retry.max_retries, 7);
    }

    #[test]
    fn test_apply_overrides_rejects_bad_number() {
        let mut config = HttpClientConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_HTTPCLIENT_RETRY_MAX).then(|| "many".to_string())
        });
        assert!(matches!(result, Err(HttpClientError::Config(_))));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = HttpClientConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.circuit_breaker.name, "users-api");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = HttpClientConfig::load_from_path(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(HttpClientError::Config(msg)) if msg.contains("absent.yaml")));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = HttpClientConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(HttpClientConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_default_path() {
        if let Ok(path) = HttpClientConfig::default_path() {
            assert!(path.ends_with("httpclient/config.yaml"));
        }
    }
}
