// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by the underlying network stack.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("Circuit breaker '{name}' is half-open and at its request limit")]
    TooManyRequests { name: String },

    #[error("Invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl HttpClientError {
    /// Wrap any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        HttpClientError::Transport(err.into())
    }

    /// Returns `true` when a circuit breaker refused the call without
    /// reaching the inner transport.
    #[must_use]
    pub fn is_circuit_rejection(&self) -> bool {
        matches!(
            self,
            HttpClientError::CircuitOpen { .. } | HttpClientError::TooManyRequests { .. }
        )
    }

    /// Returns `true` for failures below the HTTP layer.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HttpClientError::Transport(_) | HttpClientError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HttpClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_rejection_is_not_transport() {
        let open = HttpClientError::CircuitOpen {
            name: "users".to_string(),
        };
        assert!(open.is_circuit_rejection());
        assert!(!open.is_transport());

        let busy = HttpClientError::TooManyRequests {
            name: "users".to_string(),
        };
        assert!(busy.is_circuit_rejection());
    }

    #[test]
    fn test_transport_errors() {
        let err = HttpClientError::transport("connection refused");
        assert!(err.is_transport());
        assert!(!err.is_circuit_rejection());
        assert_eq!(err.to_string(), "Transport error: connection refused");

        let timeout = HttpClientError::Timeout(Duration::from_secs(30));
        assert!(timeout.is_transport());
    }
}
