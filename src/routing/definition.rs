//! Routes definition document and backend target descriptors.
//!
//! Two JSON shapes are accepted:
//!
//! ```text
//! { "rules": [ { "match_host": "a.example.com", "match_path": "/api",
//!                "target": "10.0.0.1:8080" } ],
//!   "default_target": "http://10.0.0.9" }
//!
//! { "a.example.com": "10.0.0.1:8080",
//!   "b.example.com/api": "https://10.0.0.2:9000" }
//! ```
//!
//! The second is the flat router table; its key order is rule order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Errors produced while reading or building a routes definition.
#[derive(Debug, thiserror::Error)]
pub enum RoutesError {
    /// The definition file could not be read.
    #[error("failed to read routes from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The definition is not a well-formed routes object.
    #[error("malformed routes: {0}")]
    Malformed(String),
}

/// Backend scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetScheme {
    Http,
    Https,
}

impl TargetScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetScheme::Http => "http",
            TargetScheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            TargetScheme::Http => 80,
            TargetScheme::Https => 443,
        }
    }
}

/// A backend forwarding destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TargetRef {
    pub scheme: TargetScheme,
    pub host: String,
    pub port: u16,
}

impl TargetRef {
    /// `host:port`, as used in the request URI authority.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl FromStr for TargetRef {
    type Err = RoutesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |why: &str| RoutesError::Malformed(format!("invalid target '{}': {}", s, why));

        if s.contains("://") {
            let url = Url::parse(s).map_err(|e| invalid(&e.to_string()))?;
            let scheme = match url.scheme() {
                "http" => TargetScheme::Http,
                "https" => TargetScheme::Https,
                other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
            };
            if !(url.path().is_empty() || url.path() == "/") || url.query().is_some() {
                return Err(invalid("targets cannot carry a path or query"));
            }
            let host = url.host_str().ok_or_else(|| invalid("missing host"))?.to_string();
            let port = url.port().unwrap_or_else(|| scheme.default_port());
            return Ok(TargetRef { scheme, host, port });
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("expected host:port"))?;
        if host.is_empty() || host.contains('/') {
            return Err(invalid("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("bad port"))?;
        Ok(TargetRef {
            scheme: TargetScheme::Http,
            host: host.to_string(),
            port,
        })
    }
}

/// One rule as written in the definition file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    #[serde(alias = "matchHost")]
    pub match_host: String,
    #[serde(default, alias = "matchPath", skip_serializing_if = "Option::is_none")]
    pub match_path: Option<String>,
    pub target: String,
}

/// The routes document, normalized to the structured shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesDefinition {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default, alias = "defaultTarget", skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
}

const STRUCTURED_KEYS: [&str; 3] = ["rules", "default_target", "defaultTarget"];

impl RoutesDefinition {
    /// Parse either accepted JSON shape.
    pub fn from_json(text: &str) -> Result<Self, RoutesError> {
        let value: Value = serde_json::from_str(text).map_err(|e| RoutesError::Malformed(e.to_string()))?;

        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(RoutesError::Malformed(format!(
                    "expected a JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };

        if object.keys().any(|k| STRUCTURED_KEYS.contains(&k.as_str())) {
            return serde_json::from_value(Value::Object(object))
                .map_err(|e| RoutesError::Malformed(e.to_string()));
        }

        let mut rules = Vec::with_capacity(object.len());
        for (key, target) in object {
            let target = match target {
                Value::String(t) => t,
                other => {
                    return Err(RoutesError::Malformed(format!(
                        "target for '{}' must be a string, found {}",
                        key,
                        json_kind(&other)
                    )))
                }
            };
            let (match_host, match_path) = match key.find('/') {
                Some(idx) => (key[..idx].to_string(), Some(key[idx..].to_string())),
                None => (key, None),
            };
            rules.push(RuleDefinition {
                match_host,
                match_path,
                target,
            });
        }

        Ok(RoutesDefinition {
            rules,
            default_target: None,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_definition() {
        let def = RoutesDefinition::from_json(
            r#"{
                "rules": [
                    {"matchHost": "a.example.com", "target": "10.0.0.1:8080"},
                    {"match_host": "b.example.com", "match_path": "/api", "target": "https://10.0.0.2"}
                ],
                "defaultTarget": "10.0.0.9:80"
            }"#,
        )
        .unwrap();

        assert_eq!(def.rules.len(), 2);
        assert_eq!(def.rules[1].match_path.as_deref(), Some("/api"));
        assert_eq!(def.default_target.as_deref(), Some("10.0.0.9:80"));
    }

    #[test]
    fn parses_flat_definition_in_order() {
        let def = RoutesDefinition::from_json(
            r#"{"z.example.com": "10.0.0.3:1", "a.example.com/api": "10.0.0.1:8080", "m.example.com": "10.0.0.2:2"}"#,
        )
        .unwrap();

        let hosts: Vec<_> = def.rules.iter().map(|r| r.match_host.as_str()).collect();
        assert_eq!(hosts, vec!["z.example.com", "a.example.com", "m.example.com"]);
        assert_eq!(def.rules[1].match_path.as_deref(), Some("/api"));
        assert!(def.default_target.is_none());
    }

    #[test]
    fn rejects_non_objects() {
        for text in ["[]", "42", "\"routes\"", "null", "{not json"] {
            assert!(
                matches!(RoutesDefinition::from_json(text), Err(RoutesError::Malformed(_))),
                "{text} should be malformed"
            );
        }
        assert!(RoutesDefinition::from_json(r#"{"a.example.com": 8080}"#).is_err());
        assert!(RoutesDefinition::from_json(r#"{"rules": [{"host": "x", "target": "y:1"}]}"#).is_err());
    }

    #[test]
    fn empty_object_is_an_empty_table() {
        assert_eq!(RoutesDefinition::from_json("{}").unwrap(), RoutesDefinition::default());
    }

    #[test]
    fn parses_targets() {
        let t: TargetRef = "10.0.0.1:8080".parse().unwrap();
        assert_eq!(t.scheme, TargetScheme::Http);
        assert_eq!(t.authority(), "10.0.0.1:8080");

        let t: TargetRef = "https://backend.internal".parse().unwrap();
        assert_eq!(t.to_string(), "https://backend.internal:443");

        let t: TargetRef = "http://[::1]:9000/".parse().unwrap();
        assert_eq!(t.authority(), "[::1]:9000");

        assert!("backend.internal".parse::<TargetRef>().is_err());
        assert!("ftp://backend:21".parse::<TargetRef>().is_err());
        assert!("http://backend:80/prefix".parse::<TargetRef>().is_err());
        assert!("backend:99999".parse::<TargetRef>().is_err());
    }
}
