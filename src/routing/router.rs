//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the target for a request
//! - Return matched target or explicit RouteNotFound
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) ordered scan, first match wins
//! - Default target only applies when no rule matches

use std::fmt;

use serde::Serialize;

use crate::routing::definition::{RoutesDefinition, RoutesError, TargetRef};
use crate::routing::matcher::{normalize_host, HostPattern, Matcher, PathPattern, RequestKey};

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub host: HostPattern,
    pub path: Option<PathPattern>,
    pub target: TargetRef,
}

impl Matcher for RouteRule {
    fn matches(&self, key: &RequestKey<'_>) -> bool {
        self.host.matches(key) && self.path.as_ref().map(|p| p.matches(key)).unwrap_or(true)
    }
}

/// No rule matched and no default target is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNotFound {
    pub host: String,
    pub path: String,
}

impl fmt::Display for RouteNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UNMATCHED request: {}{}", self.host, self.path)
    }
}

impl std::error::Error for RouteNotFound {}

/// Immutable routing snapshot.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    default_target: Option<TargetRef>,
    default_host: Option<String>,
}

/// Serializable view of a table, for the admin API.
#[derive(Debug, Serialize)]
pub struct RouteSummary {
    pub host: String,
    pub path: Option<String>,
    pub target: String,
}

impl RouteTable {
    /// Compile a definition. Any invalid pattern or target fails the whole build.
    pub fn build(definition: &RoutesDefinition, default_host: Option<&str>) -> Result<Self, RoutesError> {
        let mut rules = Vec::with_capacity(definition.rules.len());

        for (index, rule) in definition.rules.iter().enumerate() {
            let host = HostPattern::parse(&rule.match_host).ok_or_else(|| {
                RoutesError::Malformed(format!("rule {}: invalid host pattern '{}'", index, rule.match_host))
            })?;
            let path = match &rule.match_path {
                Some(p) => Some(PathPattern::parse(p).ok_or_else(|| {
                    RoutesError::Malformed(format!("rule {}: invalid path pattern '{}'", index, p))
                })?),
                None => None,
            };
            let target = rule.target.parse()?;
            rules.push(RouteRule { host, path, target });
        }

        let default_target = definition
            .default_target
            .as_deref()
            .map(str::parse)
            .transpose()?;

        Ok(Self {
            rules,
            default_target,
            default_host: default_host.map(normalize_host),
        })
    }

    /// Resolve a request to its target.
    ///
    /// `host` is the raw Host value (port allowed); `None` or empty uses the
    /// configured default host.
    pub fn resolve(&self, host: Option<&str>, path: &str) -> Result<&TargetRef, RouteNotFound> {
        let host = match host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) => normalize_host(h),
            None => self.default_host.clone().unwrap_or_default(),
        };
        let key = RequestKey { host: &host, path };

        self.rules
            .iter()
            .find(|rule| rule.matches(&key))
            .map(|rule| &rule.target)
            .or(self.default_target.as_ref())
            .ok_or_else(|| RouteNotFound {
                host: host.clone(),
                path: path.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn default_target(&self) -> Option<&TargetRef> {
        self.default_target.as_ref()
    }

    pub fn summary(&self) -> Vec<RouteSummary> {
        self.rules
            .iter()
            .map(|rule| RouteSummary {
                host: match &rule.host {
                    HostPattern::Any => "*".to_string(),
                    HostPattern::Exact(h) => h.clone(),
                    HostPattern::Suffix(s) => format!("*{}", s),
                },
                path: rule.path.as_ref().map(|p| match p {
                    PathPattern::Prefix(p) => p.clone(),
                    PathPattern::Glob(p) => format!("{}*", p),
                }),
                target: rule.target.to_string(),
            })
            .collect()
    }
}
