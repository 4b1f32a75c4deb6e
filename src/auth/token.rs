//! Identity token (JWT) issuance and verification.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rustls::pki_types::PrivateKeyDer;
use serde::{Deserialize, Serialize};
use x509_parser::der_parser::asn1_rs::Any;
use x509_parser::oid_registry::{
    OID_EC_P256, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_NIST_EC_P384, OID_PKCS1_RSAENCRYPTION, OID_SIG_ED25519,
};
use x509_parser::prelude::*;

use crate::config::{AuthConfig, TokenAlgorithm};

/// Claims asserted by an identity token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Subject common name of the client certificate.
    #[serde(rename = "CN")]
    pub cn: String,
    /// Issued at, already moved back by the skew allowance.
    pub iat: u64,
    /// Expiration: `iat + ttl`.
    pub exp: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to read signing key {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported signing key: {0}")]
    UnsupportedKey(String),

    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("system clock is before the UNIX epoch")]
    Clock,
}

/// Signature algorithm for a key with algorithm identifier `alg`.
fn algorithm_for(alg: &AlgorithmIdentifier<'_>) -> Option<Algorithm> {
    if alg.algorithm == OID_PKCS1_RSAENCRYPTION {
        return Some(Algorithm::RS256);
    }
    if alg.algorithm == OID_SIG_ED25519 {
        return Some(Algorithm::EdDSA);
    }
    if alg.algorithm != OID_KEY_TYPE_EC_PUBLIC_KEY {
        return None;
    }
    let curve = alg.parameters.as_ref()?.as_oid().ok()?;
    if curve == OID_EC_P256 {
        Some(Algorithm::ES256)
    } else if curve == OID_NIST_EC_P384 {
        Some(Algorithm::ES384)
    } else {
        None
    }
}

/// Algorithm of a PKCS#8 `PrivateKeyInfo`: version, then the key's identifier.
fn pkcs8_algorithm(der: &[u8]) -> Option<Algorithm> {
    let (_, info) = Any::from_der(der).ok()?;
    let (rest, _version) = Any::from_der(info.data).ok()?;
    let (_, alg) = AlgorithmIdentifier::from_der(rest).ok()?;
    algorithm_for(&alg)
}

fn now_secs() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Clock)
}

/// Signs identity tokens.
pub struct TokenIssuer {
    key: EncodingKey,
    algorithm: Algorithm,
    ttl: Duration,
    skew: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("skew", &self.skew)
            .finish()
    }
}

impl TokenIssuer {
    /// Build from PEM key material.
    ///
    /// In `Auto` mode the algorithm follows the key: RSA → RS256,
    /// P-256 → ES256, P-384 → ES384, Ed25519 → EdDSA. `Hmac` signs HS256 with
    /// the PEM bytes as the shared secret.
    pub fn from_pem(pem: &[u8], mode: TokenAlgorithm, ttl: Duration, skew: Duration) -> Result<Self, TokenError> {
        let (key, algorithm) = match mode {
            TokenAlgorithm::Hmac => (EncodingKey::from_secret(pem), Algorithm::HS256),
            TokenAlgorithm::Auto => {
                let parsed = rustls_pemfile::private_key(&mut &pem[..])
                    .map_err(|e| TokenError::UnsupportedKey(e.to_string()))?
                    .ok_or_else(|| TokenError::UnsupportedKey("no private key in PEM".into()))?;
                let algorithm = match &parsed {
                    PrivateKeyDer::Pkcs1(_) => Algorithm::RS256,
                    PrivateKeyDer::Pkcs8(der) => pkcs8_algorithm(der.secret_pkcs8_der())
                        .ok_or_else(|| TokenError::UnsupportedKey("unrecognized PKCS#8 key type".into()))?,
                    PrivateKeyDer::Sec1(_) => {
                        return Err(TokenError::UnsupportedKey(
                            "SEC1 EC keys are not supported, convert to PKCS#8".into(),
                        ))
                    }
                    _ => return Err(TokenError::UnsupportedKey("unknown key encoding".into())),
                };
                let key = match algorithm {
                    Algorithm::RS256 => EncodingKey::from_rsa_pem(pem)?,
                    Algorithm::EdDSA => EncodingKey::from_ed_pem(pem)?,
                    _ => EncodingKey::from_ec_pem(pem)?,
                };
                (key, algorithm)
            }
        };

        Ok(Self {
            key,
            algorithm,
            ttl,
            skew,
        })
    }

    /// Build from the auth configuration, reading `key_path` (the dedicated
    /// signing key when configured, otherwise the TLS key).
    pub fn from_config(config: &AuthConfig, tls_key_path: &Path) -> Result<Self, TokenError> {
        let path = config.signing_key_path.as_deref().map(Path::new).unwrap_or(tls_key_path);
        let pem = std::fs::read(path).map_err(|source| TokenError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(
            &pem,
            config.algorithm,
            Duration::from_secs(config.token_ttl_secs),
            Duration::from_secs(config.clock_skew_secs),
        )
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Claims for `cn` issued at `now` (seconds since the epoch).
    pub fn claims_at(&self, cn: &str, now: u64) -> IdentityClaims {
        let iat = now.saturating_sub(self.skew.as_secs());
        IdentityClaims {
            cn: cn.to_string(),
            iat,
            exp: iat + self.ttl.as_secs(),
        }
    }

    /// Sign a token for `cn`.
    pub fn issue(&self, cn: &str) -> Result<(String, IdentityClaims), TokenError> {
        let claims = self.claims_at(cn, now_secs()?);
        let token = encode(&Header::new(self.algorithm), &claims, &self.key)?;
        Ok((token, claims))
    }
}

/// Checks tokens produced by a [`TokenIssuer`].
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Verifier for tokens signed with the key certified by `cert_der`.
    pub fn from_certificate(cert_der: &[u8]) -> Result<Self, TokenError> {
        let (_, cert) =
            X509Certificate::from_der(cert_der).map_err(|e| TokenError::UnsupportedKey(e.to_string()))?;
        let spki = cert.public_key();
        let algorithm = algorithm_for(&spki.algorithm)
            .ok_or_else(|| TokenError::UnsupportedKey("unrecognized certificate key type".into()))?;
        let raw = spki.subject_public_key.data.as_ref();
        let key = match algorithm {
            Algorithm::RS256 => DecodingKey::from_rsa_der(raw),
            Algorithm::EdDSA => DecodingKey::from_ed_der(raw),
            _ => DecodingKey::from_ec_der(raw),
        };
        Ok(Self {
            key,
            validation: Validation::new(algorithm),
        })
    }

    /// Verifier for HS256 tokens keyed with `secret`.
    pub fn hmac(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        Ok(decode::<IdentityClaims>(token, &self.key, &self.validation)?.claims)
    }
}
