// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging configuration for outgoing HTTP requests and responses.
//!
//! Used by [`LoggingLayer`](crate::layers::LoggingLayer) to emit one
//! structured event per request with timing, status and optionally headers.
//!
//! # Example
//!
//! ```
//! use httpclient_rs::runtime::{LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::new()
//!     .with_success_level(LogLevel::Debug)
//!     .with_headers(true)
//!     .with_sensitive_header("x-session");
//!
//! assert!(config.is_sensitive("X-Session"));
//! assert!(config.is_sensitive("Authorization"));
//! ```

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, trace, warn};

pub(crate) const HTTP_TARGET: &str = "httpclient::http";

/// Level of the per-request event. Spelled in lowercase in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Nothing is emitted.
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        f.write_str(name)
    }
}

/// Structured fields of one logged request.
#[derive(Debug)]
pub(crate) struct RequestEvent<'a> {
    pub(crate) method: &'a str,
    pub(crate) uri: &'a str,
    pub(crate) headers: Option<&'a str>,
    pub(crate) status: Option<u16>,
    pub(crate) elapsed_ms: u64,
    pub(crate) error: Option<&'a str>,
}

macro_rules! request_event {
    ($level:ident, $event:expr) => {
        $level!(
            target: HTTP_TARGET,
            method = $event.method,
            uri = $event.uri,
            headers = $event.headers,
            status = $event.status,
            elapsed_ms = $event.elapsed_ms,
            error = $event.error,
            "{}",
            $event.message()
        )
    };
}

impl RequestEvent<'_> {
    fn message(&self) -> &'static str {
        if self.error.is_some() {
            "http request failed"
        } else {
            "http request completed"
        }
    }
}

impl LogLevel {
    /// Emit `event` at this level under the HTTP target.
    pub(crate) fn emit(self, event: &RequestEvent<'_>) {
        match self {
            LogLevel::Trace => request_event!(trace, event),
            LogLevel::Debug => request_event!(debug, event),
            LogLevel::Info => request_event!(info, event),
            LogLevel::Warn => request_event!(warn, event),
            LogLevel::Error => request_event!(error, event),
            LogLevel::Off => {}
        }
    }
}

fn default_sensitive_headers() -> Vec<String> {
    ["authorization", "x-api-key", "x-auth-token", "cookie"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// What [`LoggingLayer`](crate::layers::LoggingLayer) logs and at which level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level for responses below 400.
    pub success_level: LogLevel,
    /// Log level for 4xx/5xx responses and transport errors.
    pub error_level: LogLevel,
    /// Whether to log request headers.
    pub log_headers: bool,
    /// Whether to log the query string along with the path.
    pub log_query: bool,
    /// Replace values of `sensitive_headers` with `[REDACTED]`.
    pub redact_sensitive: bool,
    /// Header names compared case-insensitively.
    pub sensitive_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            success_level: LogLevel::Info,
            error_level: LogLevel::Error,
            log_headers: false,
            log_query: false,
            redact_sensitive: true,
            sensitive_headers: default_sensitive_headers(),
        }
    }
}

impl LoggingConfig {
    /// Defaults: successes at info, failures at error, no headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Level for responses below 400.
    #[must_use]
    pub fn with_success_level(mut self, level: LogLevel) -> Self {
        self.success_level = level;
        self
    }

    /// Level for error statuses and failed calls.
    #[must_use]
    pub fn with_error_level(mut self, level: LogLevel) -> Self {
        self.error_level = level;
        self
    }

    /// Enable or disable header logging.
    #[must_use]
    pub fn with_headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    /// Enable or disable query string logging.
    #[must_use]
    pub fn with_query(mut self, enabled: bool) -> Self {
        self.log_query = enabled;
        self
    }

    /// Turn header redaction on or off.
    #[must_use]
    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redact_sensitive = enabled;
        self
    }

    /// Redact one more header.
    #[must_use]
    pub fn with_sensitive_header(mut self, header: impl Into<String>) -> Self {
        self.sensitive_headers.push(header.into());
        self
    }

    /// Successes at debug, with headers and query strings.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            success_level: LogLevel::Debug,
            log_headers: true,
            log_query: true,
            ..Self::default()
        }
    }

    /// Only failures, at warn.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            success_level: LogLevel::Off,
            error_level: LogLevel::Warn,
            ..Self::default()
        }
    }

    /// Returns `true` if the header value must not be logged.
    #[must_use]
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.redact_sensitive
            && self
                .sensitive_headers
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name))
    }

    /// Render headers as `name=value` pairs, redacting sensitive ones.
    #[must_use]
    pub fn format_headers(&self, headers: &HeaderMap) -> String {
        let parts: Vec<String> = headers
            .iter()
            .map(|(name, value)| {
                if self.is_sensitive(name.as_str()) {
                    format!("{}=[REDACTED]", name)
                } else {
                    format!("{}={:?}", name, value)
                }
            })
            .collect();
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_level_display_matches_yaml_spelling() {
        for level in [LogLevel::Trace, LogLevel::Warn, LogLevel::Off] {
            let yaml = serde_yaml::to_string(&level).unwrap();
            assert_eq!(yaml.trim(), level.to_string());
        }
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_defaults_redact_credentials() {
        let config = LoggingConfig::default();
        assert_eq!(
            (config.success_level, config.error_level),
            (LogLevel::Info, LogLevel::Error)
        );
        assert!(config.is_sensitive("X-Api-Key"));
        assert!(config.sensitive_headers.contains(&"cookie".to_string()));
        assert!(!config.log_headers);
    }

    #[test]
    fn test_logging_config_presets() {
        let verbose = LoggingConfig::verbose();
        assert_eq!(verbose.success_level, LogLevel::Debug);
        assert!(verbose.log_headers);

        let quiet = LoggingConfig::quiet();
        assert_eq!(quiet.success_level, LogLevel::Off);
        assert_eq!(quiet.error_level, LogLevel::Warn);
    }

    #[test]
    fn test_redaction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let rendered = LoggingConfig::default().format_headers(&headers);
        assert!(rendered.contains("authorization=[REDACTED]"));
        assert!(rendered.contains("accept=\"application/json\""));
        assert!(!rendered.contains("secret"));

        let unredacted = LoggingConfig::default()
            .with_redaction(false)
            .format_headers(&headers);
        assert!(unredacted.contains("secret"));
    }
}
