//! Route matching logic.
//!
//! # Responsibilities
//! - Match path patterns (`prefix*` wildcard, or plain prefix)
//! - Match the request method against an allow-list
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Method matching is exact (`GET` ≠ `get`), as methods are tokens
//! - Empty method list = always matches (wildcard)
//! - No regex to guarantee O(n) matching

/// Trait for matching a request line against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, path: &str, method: &str) -> bool;
}

/// Matches the request path against a route pattern.
///
/// A pattern ending in `*` matches any path starting with the text before
/// the `*`. Any other pattern must be a prefix of the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    prefix: String,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Remove the literal prefix from `path`; the result always starts with `/`.
    pub fn strip<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        if rest.starts_with('/') {
            std::borrow::Cow::Borrowed(rest)
        } else {
            std::borrow::Cow::Owned(format!("/{}", rest))
        }
    }
}

impl Matcher for PathPattern {
    fn matches(&self, path: &str, _method: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Matches the request method against an allow-list.
#[derive(Debug, Clone, Default)]
pub struct MethodMatcher {
    allowed: Vec<String>,
}

impl MethodMatcher {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, _path: &str, method: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|m| m == method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, path: &str, method: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(path, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_pattern() {
        let pattern = PathPattern::new("/api*");
        assert!(pattern.matches("/api", "GET"));
        assert!(pattern.matches("/api/v1/users", "GET"));
        assert!(pattern.matches("/apikeys", "GET"));
        assert!(!pattern.matches("/images", "GET"));
    }

    #[test]
    fn test_plain_pattern_is_prefix() {
        let pattern = PathPattern::new("/api");
        assert!(pattern.matches("/api", "GET"));
        assert!(pattern.matches("/api/v1", "GET"));
        assert!(!pattern.matches("/ap", "GET"));
    }

    #[test]
    fn test_strip() {
        let pattern = PathPattern::new("/api*");
        assert_eq!(pattern.strip("/api/users"), "/users");
        assert_eq!(pattern.strip("/api"), "/");
        assert_eq!(pattern.strip("/apiv2"), "/v2");
    }

    #[test]
    fn test_method_matcher() {
        let any = MethodMatcher::default();
        assert!(any.matches("/", "DELETE"));

        let restricted = MethodMatcher::new(["GET", "POST"]);
        assert!(restricted.matches("/", "POST"));
        assert!(!restricted.matches("/", "PUT"));
    }

    #[test]
    fn test_and_matcher() {
        let matcher = AndMatcher::new(vec![
            Box::new(PathPattern::new("/api")),
            Box::new(MethodMatcher::new(["GET"])),
        ]);
        assert!(matcher.matches("/api/x", "GET"));
        assert!(!matcher.matches("/api/x", "POST"));
        assert!(!matcher.matches("/other", "GET"));
    }
}
