//! Route matching logic.
//!
//! # Responsibilities
//! - Match request path against a route pattern
//! - Match header name=value constraints
//! - Conditions are combined with AND semantics by `RouteMatch`
//!
//! # Design Decisions
//! - Header names are case-insensitive (RFC 9110), values exact
//! - Path matching is ASCII case-insensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request path and headers satisfy this condition.
    fn matches(&self, path: &str, headers: &HeaderMap) -> bool;
}

/// A path pattern. A trailing `{**name}` segment matches any remainder;
/// anything else must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathPattern {
    pattern: String,
}

impl PathPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Literal prefix before a catch-all segment, if the pattern has one.
    fn catch_all_prefix(&self) -> Option<&str> {
        let start = self.pattern.rfind("{**")?;
        self.pattern[start..]
            .ends_with('}')
            .then(|| &self.pattern[..start])
    }
}

impl Matcher for PathPattern {
    fn matches(&self, path: &str, _headers: &HeaderMap) -> bool {
        match self.catch_all_prefix() {
            Some(prefix) => {
                // "/api/{**rest}" also accepts "/api"
                let bare = prefix.strip_suffix('/').unwrap_or(prefix);
                let head = path.get(..prefix.len());
                head.is_some_and(|h| h.eq_ignore_ascii_case(prefix))
                    || path.eq_ignore_ascii_case(bare)
            }
            None => path.eq_ignore_ascii_case(&self.pattern),
        }
    }
}

/// Requires a header to be present with an exact value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub name: String,
    pub value: String,
}

impl HeaderMatch {
    /// Create a new header matcher.
    /// The name is normalized to lowercase for case-insensitive matching.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            value: value.into(),
        }
    }
}

impl Matcher for HeaderMatch {
    fn matches(&self, _path: &str, headers: &HeaderMap) -> bool {
        headers
            .get_all(self.name.as_str())
            .iter()
            .any(|v| v.as_bytes() == self.value.as_bytes())
    }
}
