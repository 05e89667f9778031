// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::runtime::{DefaultRetryClassifier, RetryClassifier, RetryConfig, RetryPolicy};
use tower::retry::Retry;
use tower::Layer;

/// Service produced by [`RetryLayer`].
pub type RetryService<S, C = DefaultRetryClassifier> = Retry<RetryPolicy<C>, S>;

/// Tower layer that re-sends retryable requests.
///
/// The loop is `tower::retry::Retry`; this layer only hands it a
/// [`RetryPolicy`] built from the configuration. When retries run out the
/// last response or error is returned as is. Request bodies must be `Clone`.
#[derive(Debug, Clone)]
pub struct RetryLayer<C = DefaultRetryClassifier> {
    policy: RetryPolicy<C>,
}

impl RetryLayer {
    /// Create a new `RetryLayer` with the default classifier.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            policy: RetryPolicy::new(config),
        }
    }
}

impl<C: RetryClassifier> RetryLayer<C> {
    /// Replace the retry classifier.
    #[must_use]
    pub fn with_classifier<C2: RetryClassifier>(self, classifier: C2) -> RetryLayer<C2> {
        RetryLayer {
            policy: RetryPolicy::with_classifier(self.policy.config().clone(), classifier),
        }
    }

    /// The retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        self.policy.config()
    }
}

impl<S, C: Clone> Layer<S> for RetryLayer<C> {
    type Service = RetryService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry::new(self.policy.clone(), inner)
    }
}
