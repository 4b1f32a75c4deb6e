//! Cipher suite policy.
//!
//! Accepts an ordered list of suite names (IANA, OpenSSL, or rustls
//! spelling) plus the OpenSSL-style `HIGH` keyword and `!`-prefixed
//! exclusion markers. Any name naming an excluded algorithm family is
//! rejected outright; suites the ring provider does not implement are
//! skipped with a warning.

use std::sync::Arc;

use rustls::crypto::ring::{cipher_suite, default_provider};
use rustls::crypto::CryptoProvider;
use rustls::{SupportedCipherSuite, SupportedProtocolVersion};

/// Algorithm families that are never negotiated.
pub const EXCLUDED_MARKERS: [&str; 10] = [
    "ANON", "NULL", "EXPORT", "DES", "RC4", "MD5", "PSK", "SRP", "CAMELLIA", "ADH",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    /// A configured name belongs to an excluded algorithm family.
    #[error("cipher suite '{0}' is excluded by policy")]
    Excluded(String),

    /// Nothing in the list maps to a supported suite.
    #[error("no supported cipher suites in the configured list")]
    NoUsableSuites,
}

/// (IANA name, OpenSSL name, suite) in preference order.
fn known_suites() -> [(&'static str, &'static str, SupportedCipherSuite); 9] {
    [
        ("TLS_AES_256_GCM_SHA384", "TLS_AES_256_GCM_SHA384", cipher_suite::TLS13_AES_256_GCM_SHA384),
        (
            "TLS_CHACHA20_POLY1305_SHA256",
            "TLS_CHACHA20_POLY1305_SHA256",
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        ),
        ("TLS_AES_128_GCM_SHA256", "TLS_AES_128_GCM_SHA256", cipher_suite::TLS13_AES_128_GCM_SHA256),
        (
            "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
            "ECDHE-ECDSA-AES256-GCM-SHA384",
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        ),
        (
            "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
            "ECDHE-RSA-AES256-GCM-SHA384",
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        ),
        (
            "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
            "ECDHE-ECDSA-CHACHA20-POLY1305",
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        ),
        (
            "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
            "ECDHE-RSA-CHACHA20-POLY1305",
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ),
        (
            "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
            "ECDHE-ECDSA-AES128-GCM-SHA256",
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        ),
        (
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
            "ECDHE-RSA-AES128-GCM-SHA256",
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ),
    ]
}

/// rustls' own spelling, e.g. `TLS13_AES_256_GCM_SHA384`.
pub fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// True if `name` mentions an excluded algorithm family.
pub fn is_excluded(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    EXCLUDED_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// An ordered, vetted set of cipher suites.
#[derive(Debug, Clone)]
pub struct CipherPolicy {
    suites: Vec<SupportedCipherSuite>,
}

impl Default for CipherPolicy {
    /// All AEAD forward-secret suites, TLS 1.3 first.
    fn default() -> Self {
        Self {
            suites: known_suites().into_iter().map(|(_, _, suite)| suite).collect(),
        }
    }
}

impl CipherPolicy {
    /// Resolve a configured list. Empty input gives the default policy.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, CipherError> {
        if names.is_empty() {
            return Ok(Self::default());
        }

        let known = known_suites();
        let mut suites: Vec<SupportedCipherSuite> = Vec::new();
        let mut push = |suite: SupportedCipherSuite| {
            if !suites.iter().any(|s| s.suite() == suite.suite()) {
                suites.push(suite);
            }
        };

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || name.starts_with('!') {
                // Exclusions are always in force.
                continue;
            }
            if is_excluded(name) {
                return Err(CipherError::Excluded(name.to_string()));
            }
            if name.eq_ignore_ascii_case("HIGH") || name.eq_ignore_ascii_case("DEFAULT") {
                known.iter().for_each(|(_, _, suite)| push(*suite));
                continue;
            }
            match known.iter().find(|(iana, openssl, suite)| {
                name.eq_ignore_ascii_case(iana)
                    || name.eq_ignore_ascii_case(openssl)
                    || name.eq_ignore_ascii_case(&suite_name(suite))
            }) {
                Some((_, _, suite)) => push(*suite),
                None => tracing::warn!(cipher = name, "Cipher suite not supported, skipping"),
            }
        }

        if suites.is_empty() {
            return Err(CipherError::NoUsableSuites);
        }
        Ok(Self { suites })
    }

    pub fn suites(&self) -> &[SupportedCipherSuite] {
        &self.suites
    }

    pub fn names(&self) -> Vec<String> {
        self.suites.iter().map(suite_name).collect()
    }

    /// Protocol versions implied by the chosen suites.
    pub fn protocol_versions(&self) -> Vec<&'static SupportedProtocolVersion> {
        let mut versions = Vec::with_capacity(2);
        if self.suites.iter().any(|s| s.tls13().is_some()) {
            versions.push(&rustls::version::TLS13);
        }
        if self.suites.iter().any(|s| s.tls13().is_none()) {
            versions.push(&rustls::version::TLS12);
        }
        versions
    }

    /// A ring provider restricted to this policy.
    pub fn provider(&self) -> Arc<CryptoProvider> {
        Arc::new(CryptoProvider {
            cipher_suites: self.suites.clone(),
            ..default_provider()
        })
    }
}
