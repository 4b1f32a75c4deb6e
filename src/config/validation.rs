//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check referenced files exist before the TLS layer reads them
//! - Reject cipher suites excluded by policy
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::{GatewayConfig, PLACEHOLDER_API_KEY};
use crate::tls::cipher::CipherPolicy;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.http_address", &config.listener.http_address);
    if config.tls.is_some() {
        check_address(&mut errors, "listener.https_address", &config.listener.https_address);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if let Some(tls) = &config.tls {
        check_file(&mut errors, "tls.cert_path", &tls.cert_path);
        check_file(&mut errors, "tls.key_path", &tls.key_path);
        if let Some(ca_path) = &tls.ca_path {
            check_file(&mut errors, "tls.ca_path", ca_path);
        }
        if !tls.cipher_suites.is_empty() {
            if let Err(e) = CipherPolicy::from_names(&tls.cipher_suites) {
                errors.push(ValidationError::new("tls.cipher_suites", e.to_string()));
            }
        }
        if tls.session_capacity == 0 {
            errors.push(ValidationError::new("tls.session_capacity", "must be greater than 0"));
        }
    }

    if config.ocsp.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new("ocsp.fetch_timeout_secs", "must be greater than 0"));
    }

    if config.routes.path.trim().is_empty() {
        errors.push(ValidationError::new("routes.path", "must not be empty"));
    }

    if !config.auth.path.starts_with('/') {
        errors.push(ValidationError::new("auth.path", "must start with '/'"));
    }
    if config.auth.cookie_name.is_empty()
        || config.auth.cookie_name.contains(|c: char| c == ';' || c == '=' || c.is_whitespace())
    {
        errors.push(ValidationError::new("auth.cookie_name", "must be a non-empty cookie token"));
    }
    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be greater than 0"));
    }
    if config.auth.clock_skew_secs >= config.auth.token_ttl_secs {
        errors.push(ValidationError::new("auth.clock_skew_secs", "must be shorter than the token lifetime"));
    }
    if let Some(path) = &config.auth.signing_key_path {
        check_file(&mut errors, "auth.signing_key_path", path);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError::new("timeouts.handshake_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new("admin.api_key", "must be set when the admin API is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}

fn check_file(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !Path::new(value).is_file() {
        errors.push(ValidationError::new(field, format!("file not found: {}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.http_address = "not-an-address".into();
        config.auth.path = "pki".into();
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["listener.http_address", "auth.path", "timeouts.request_secs"]);
    }

    #[test]
    fn rejects_missing_tls_files_and_excluded_ciphers() {
        let mut config = GatewayConfig::default();
        config.tls = Some(TlsConfig {
            cert_path: "/nonexistent/server.crt".into(),
            key_path: "/nonexistent/server.key".into(),
            ca_path: None,
            cipher_suites: vec!["TLS_RSA_WITH_RC4_128_MD5".into()],
            session_capacity: 10,
            session_ttl_secs: 60,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"tls.cert_path"));
        assert!(fields.contains(&"tls.key_path"));
        assert!(fields.contains(&"tls.cipher_suites"));
    }

    #[test]
    fn admin_requires_real_key() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());
    }
}
