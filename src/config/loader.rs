//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TokenAlgorithm;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = parse_config(
            r#"
            [routes]
            path = "conf/routes.json"
            default_host = "www.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.routes.default_host.as_deref(), Some("www.example.com"));
        assert_eq!(config.listener.http_address, "0.0.0.0:80");
        assert!(config.tls.is_none());
        assert_eq!(config.auth.path, "/pki/");
        assert_eq!(config.auth.token_ttl_secs, 604_800);
        assert_eq!(config.auth.algorithm, TokenAlgorithm::Auto);
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = parse_config("[listener\nhttp_address = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn semantic_errors_are_reported() {
        let err = parse_config(
            r#"
            [auth]
            path = "no-slash"
            algorithm = "hmac"
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors[0].field, "auth.path"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/proxyconf.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
