//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from the TOML config file.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (plaintext and TLS bind addresses).
    pub listener: ListenerConfig,

    /// TLS termination settings. The TLS listener is disabled when absent.
    pub tls: Option<TlsConfig>,

    /// OCSP stapling settings.
    pub ocsp: OcspConfig,

    /// Routes definition location and host fallback.
    pub routes: RoutesConfig,

    /// Client-certificate authentication and token issuance.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (e.g., "0.0.0.0:80").
    pub http_address: String,

    /// TLS bind address (e.g., "0.0.0.0:443"). Only used when `[tls]` is set.
    pub https_address: String,

    /// Maximum concurrent connections across both listeners (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:80".to_string(),
            https_address: "0.0.0.0:443".to_string(),
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the encrypted listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to the server certificate file (PEM). May include intermediates.
    pub cert_path: String,

    /// Path to the server private key file (PEM).
    pub key_path: String,

    /// Path to the CA chain bundle (PEM). Intermediates from it are appended
    /// to the served chain; all of it is trusted for client certificates.
    #[serde(default)]
    pub ca_path: Option<String>,

    /// Ordered cipher suite allow-list. Empty means the built-in policy.
    #[serde(default)]
    pub cipher_suites: Vec<String>,

    /// Maximum number of resumable sessions kept in memory.
    #[serde(default = "default_session_capacity")]
    pub session_capacity: usize,

    /// Lifetime of a stored session in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

fn default_session_capacity() -> usize {
    10_000
}

fn default_session_ttl() -> u64 {
    300
}

/// OCSP stapling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OcspConfig {
    /// Staple OCSP responses when the certificate names a responder.
    pub enabled: bool,

    /// Abort the handshake when no staple can be obtained.
    pub strict: bool,

    /// Upper bound for a single responder round trip in seconds.
    pub fetch_timeout_secs: u64,

    /// Refetch entries older than this. Unset keeps responses until cleared.
    pub max_age_secs: Option<u64>,
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
            fetch_timeout_secs: 5,
            max_age_secs: None,
        }
    }
}

/// Routes definition settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Path to the JSON routes definition.
    pub path: String,

    /// Host used for requests that carry no Host header.
    pub default_host: Option<String>,

    /// Rebuild the table whenever the definition file changes.
    pub watch: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            path: "conf/routes.json".to_string(),
            default_host: None,
            watch: true,
        }
    }
}

/// Token signing algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenAlgorithm {
    /// RS256 for RSA keys, ES256/ES384 for EC keys.
    #[default]
    Auto,
    /// HS256 keyed with the raw bytes of the key file.
    Hmac,
}

/// Client-certificate authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Reserved request path that starts the client-certificate flow.
    pub path: String,

    /// Name of the cookie carrying the issued token.
    pub cookie_name: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Seconds subtracted from `iat` to tolerate client clock skew.
    pub clock_skew_secs: u64,

    /// Dedicated signing key (PEM). Defaults to the TLS private key.
    ///
    /// In `auto` mode the key must be PKCS#1 (RSA) or PKCS#8. SEC1
    /// (`EC PRIVATE KEY`) keys are refused at startup even though the TLS
    /// listener accepts them; convert with `openssl pkcs8 -topk8 -nocrypt`.
    pub signing_key_path: Option<String>,

    /// Signing algorithm selection.
    pub algorithm: TokenAlgorithm,

    /// Upper bound for obtaining the client certificate, in seconds.
    pub client_cert_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            path: "/pki/".to_string(),
            cookie_name: "jwt".to_string(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            clock_skew_secs: 30,
            signing_key_path: None,
            algorithm: TokenAlgorithm::Auto,
            client_cert_timeout_secs: 10,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// TLS handshake timeout in seconds, including OCSP stapling.
    pub handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            handshake_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin control plane configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Validation rejects it when enabled.
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Default admin key; refused by validation when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";
