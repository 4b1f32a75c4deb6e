//! Route matching logic.
//!
//! # Responsibilities
//! - Match request host (exact, `*.suffix` wildcard, or any)
//! - Match path prefix on segment boundaries, or raw `prefix*` globs
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive and ignores any `:port` suffix
//! - Path matching is case-sensitive
//! - Absent path condition = always matches
//! - No regex to guarantee O(n) matching

/// The parts of a request that routing looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestKey<'a> {
    /// Host without port, lowercased.
    pub host: &'a str,
    pub path: &'a str,
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, key: &RequestKey<'_>) -> bool;
}

/// Host condition of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// `*`
    Any,
    /// `a.example.com`
    Exact(String),
    /// `*.example.com`, stored as `.example.com`.
    Suffix(String),
}

impl HostPattern {
    /// Parse a host pattern. Returns `None` for empty or misplaced wildcards.
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*" {
            return Some(HostPattern::Any);
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if suffix.is_empty() || suffix.contains('*') {
                return None;
            }
            return Some(HostPattern::Suffix(format!(".{}", suffix)));
        }
        if pattern.is_empty() || pattern.contains('*') || pattern.contains('/') {
            return None;
        }
        Some(HostPattern::Exact(strip_port(&pattern).to_string()))
    }
}

impl Matcher for HostPattern {
    fn matches(&self, key: &RequestKey<'_>) -> bool {
        match self {
            HostPattern::Any => true,
            HostPattern::Exact(expected) => key.host == expected,
            HostPattern::Suffix(suffix) => key.host.len() > suffix.len() && key.host.ends_with(suffix.as_str()),
        }
    }
}

/// Path condition of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches `prefix` itself and anything below it.
    Prefix(String),
    /// `prefix*`: plain string prefix.
    Glob(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if !pattern.starts_with('/') {
            return None;
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            if prefix.contains('*') {
                return None;
            }
            return Some(PathPattern::Glob(prefix.to_string()));
        }
        if pattern.contains('*') {
            return None;
        }
        Some(PathPattern::Prefix(pattern.to_string()))
    }
}

impl Matcher for PathPattern {
    fn matches(&self, key: &RequestKey<'_>) -> bool {
        match self {
            PathPattern::Glob(prefix) => key.path.starts_with(prefix.as_str()),
            PathPattern::Prefix(prefix) => match key.path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// Normalize a request host: drop the port and lowercase it.
pub fn normalize_host(host: &str) -> String {
    strip_port(host.trim()).to_ascii_lowercase()
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<'a>(host: &'a str, path: &'a str) -> RequestKey<'a> {
        RequestKey { host, path }
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostPattern::parse("Example.com").unwrap();

        assert!(matcher.matches(&key("example.com", "/")));
        assert!(matcher.matches(&key(&normalize_host("EXAMPLE.COM:8443"), "/")));
        assert!(!matcher.matches(&key("other.com", "/")));
    }

    #[test]
    fn test_wildcard_host() {
        let matcher = HostPattern::parse("*.example.com").unwrap();

        assert!(matcher.matches(&key("a.example.com", "/")));
        assert!(matcher.matches(&key("x.y.example.com", "/")));
        assert!(!matcher.matches(&key("example.com", "/")));
        assert!(!matcher.matches(&key("badexample.com", "/")));

        assert!(HostPattern::parse("*").unwrap().matches(&key("anything", "/")));
        assert!(HostPattern::parse("a.*.com").is_none());
        assert!(HostPattern::parse("").is_none());
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathPattern::parse("/api").unwrap();

        assert!(matcher.matches(&key("h", "/api")));
        assert!(matcher.matches(&key("h", "/api/v1")));
        assert!(!matcher.matches(&key("h", "/apix")));
        assert!(!matcher.matches(&key("h", "/images")));

        let root = PathPattern::parse("/").unwrap();
        assert!(root.matches(&key("h", "/anything")));
    }

    #[test]
    fn test_glob_path() {
        let matcher = PathPattern::parse("/api*").unwrap();
        assert!(matcher.matches(&key("h", "/apix")));
        assert!(!matcher.matches(&key("h", "/ap")));
        assert!(PathPattern::parse("api").is_none());
        assert!(PathPattern::parse("/a*b").is_none());
    }

    #[test]
    fn normalize_host_strips_ports() {
        assert_eq!(normalize_host("A.Example.com:80"), "a.example.com");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
        assert_eq!(normalize_host("[::1]"), "[::1]");
        assert_eq!(normalize_host("plain"), "plain");
    }
}
