// SPDX-License-Identifier: MIT OR Apache-2.0

//! Path-pattern reduction for bounded-cardinality metric labels.
//!
//! Concrete request paths such as `/user/123/orders` are collapsed into
//! templates such as `/user/{id}/orders` before they become label values.
//!
//! Rules are kept in an ordered list and the first matching rule wins, so
//! more specific patterns must be registered before more generic ones.
//!
//! # Example
//!
//! ```
//! use httpclient_rs::runtime::PathPatterns;
//!
//! let patterns = PathPatterns::try_from_pairs([
//!     (r"/user/\d+/subservice", "/user/{id}/subservice"),
//!     (r"/user/\d+", "/user/{id}"),
//! ])
//! .unwrap();
//!
//! assert_eq!(patterns.reduce("/user/123/subservice"), "/user/{id}/subservice");
//! assert_eq!(patterns.reduce("/user/123"), "/user/{id}");
//! assert_eq!(patterns.reduce("/health"), "/health");
//! ```

use crate::error::{HttpClientError, Result};
use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
struct PathRule {
    pattern: String,
    /// `None` when the pattern failed to compile.
    matcher: Option<Regex>,
    label: String,
}

/// Ordered table of `(pattern, label)` rules.
#[derive(Debug, Clone, Default)]
pub struct PathPatterns {
    rules: Vec<PathRule>,
}

impl PathPatterns {
    /// Create an empty table. An empty table reduces every path to itself.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from ordered pairs, failing on the first malformed pattern.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::InvalidPattern` if a pattern does not compile.
    pub fn try_from_pairs<I, P, L>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, L)>,
        P: Into<String>,
        L: Into<String>,
    {
        let mut patterns = Self::new();
        for (pattern, label) in pairs {
            patterns.try_push(pattern, label)?;
        }
        Ok(patterns)
    }

    /// Build a table from ordered pairs, keeping malformed patterns in place.
    ///
    /// A malformed rule is logged once here. When [`reduce`](Self::reduce)
    /// reaches it, the raw path is returned.
    #[must_use]
    pub fn from_pairs_lossy<I, P, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, L)>,
        P: Into<String>,
        L: Into<String>,
    {
        let rules = pairs
            .into_iter()
            .map(|(pattern, label)| {
                let pattern = pattern.into();
                let matcher = match Regex::new(&pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(
                            target: "httpclient::patterns",
                            pattern = %pattern,
                            error = %e,
                            "invalid path pattern, paths reaching this rule stay unreduced"
                        );
                        None
                    }
                };
                PathRule {
                    pattern,
                    matcher,
                    label: label.into(),
                }
            })
            .collect();
        Self { rules }
    }

    /// Append a rule with the lowest priority so far.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::InvalidPattern` if the pattern does not compile.
    pub fn try_push(&mut self, pattern: impl Into<String>, label: impl Into<String>) -> Result<()> {
        let pattern = pattern.into();
        let matcher = Regex::new(&pattern).map_err(|source| HttpClientError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        self.rules.push(PathRule {
            pattern,
            matcher: Some(matcher),
            label: label.into(),
        });
        Ok(())
    }

    /// Builder form of [`try_push`](Self::try_push).
    ///
    /// # Errors
    ///
    /// Returns `HttpClientError::InvalidPattern` if the pattern does not compile.
    pub fn with_pattern(mut self, pattern: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        self.try_push(pattern, label)?;
        Ok(self)
    }

    /// Reduce a concrete path to the label of the first matching rule.
    ///
    /// Returns `path` unchanged when no rule matches, or when the first rule
    /// reached before a match is malformed.
    pub fn reduce<'a>(&'a self, path: &'a str) -> &'a str {
        for rule in &self.rules {
            match &rule.matcher {
                Some(re) if re.is_match(path) => return &rule.label,
                Some(_) => {}
                None => return path,
            }
        }
        path
    }

    /// Number of rules in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Patterns in priority order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.pattern.as_str())
    }

    /// Returns `true` if every rule compiled.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rules.iter().all(|r| r.matcher.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBSERVICE: &str = r"/user/\d+/subservice";
    const USER: &str = r"/user/\d+";

    #[test]
    fn test_specific_rule_first() {
        let patterns = PathPatterns::try_from_pairs([
            (SUBSERVICE, "/user/{id}/subservice"),
            (USER, "/user/{id}"),
        ])
        .unwrap();

        assert_eq!(patterns.reduce("/user/123/subservice"), "/user/{id}/subservice");
        assert_eq!(patterns.reduce("/user/123"), "/user/{id}");
    }

    #[test]
    fn test_generic_rule_first_wins() {
        let patterns = PathPatterns::try_from_pairs([
            (USER, "/user/{id}"),
            (SUBSERVICE, "/user/{id}/subservice"),
        ])
        .unwrap();

        assert_eq!(patterns.reduce("/user/123/subservice"), "/user/{id}");
    }

    #[test]
    fn test_loose_patterns_shortest_first() {
        let patterns = PathPatterns::try_from_pairs([
            (r"/user/\d?.+", "/user/{userId}"),
            (r"/user/\d?.+/subservice", "/user/{userId}/subservice"),
        ])
        .unwrap();

        assert_eq!(
            patterns.reduce("/user/123/subservice/subservice2"),
            "/user/{userId}"
        );
        assert_eq!(patterns.reduce("/user/123"), "/user/{userId}");
    }

    #[test]
    fn test_no_match_returns_path() {
        let patterns = PathPatterns::try_from_pairs([(USER, "/user/{id}")]).unwrap();
        assert_eq!(patterns.reduce("/orders/42"), "/orders/42");
        assert_eq!(PathPatterns::new().reduce("/anything"), "/anything");
    }

    #[test]
    fn test_unanchored_match() {
        let patterns = PathPatterns::try_from_pairs([(r"\d+", "{n}")]).unwrap();
        assert_eq!(patterns.reduce("/v1/items/77/detail"), "{n}");
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let patterns = PathPatterns::try_from_pairs([
            (SUBSERVICE, "/user/{id}/subservice"),
            (USER, "/user/{id}"),
        ])
        .unwrap();

        let first = patterns.reduce("/user/9/subservice").to_string();
        let second = patterns.reduce("/user/9/subservice").to_string();
        assert_eq!(first, second);
        assert_eq!(patterns.len(), 2);
    }

    #[test]
    fn test_strict_construction_rejects_bad_pattern() {
        let result = PathPatterns::try_from_pairs([(USER, "/user/{id}"), ("/user/(", "broken")]);
        match result {
            Err(HttpClientError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "/user/("),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_lossy_construction_fails_closed() {
        let patterns =
            PathPatterns::from_pairs_lossy([("/user/(", "broken"), (USER, "/user/{id}")]);

        assert!(!patterns.is_valid());
        assert_eq!(patterns.len(), 2);
        // The malformed rule is reached first, so the path stays raw.
        assert_eq!(patterns.reduce("/user/123"), "/user/123");
    }

    #[test]
    fn test_lossy_rule_after_match_is_not_reached() {
        let patterns =
            PathPatterns::from_pairs_lossy([(USER, "/user/{id}"), ("/user/(", "broken")]);

        assert_eq!(patterns.reduce("/user/123"), "/user/{id}");
        assert_eq!(patterns.reduce("/orders"), "/orders");
    }

    #[test]
    fn test_builder_preserves_order() {
        let patterns = PathPatterns::new()
            .with_pattern(SUBSERVICE, "/user/{id}/subservice")
            .and_then(|p| p.with_pattern(USER, "/user/{id}"))
            .unwrap();

        let order: Vec<&str> = patterns.patterns().collect();
        assert_eq!(order, vec![SUBSERVICE, USER]);
    }
}
