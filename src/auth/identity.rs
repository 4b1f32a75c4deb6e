//! Peer certificate identity extraction.

use serde::Serialize;
use x509_parser::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unreadable peer certificate: {0}")]
    Malformed(String),

    #[error("peer certificate subject has no common name")]
    MissingCommonName,
}

/// What the gateway reports about a client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerIdentity {
    pub common_name: String,
    pub subject: String,
    pub issuer: String,
    /// Colon-separated hex.
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
}

impl PeerIdentity {
    pub fn from_der(der: &[u8]) -> Result<Self, IdentityError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| IdentityError::Malformed(e.to_string()))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .map(|cn| cn.as_str().map_err(|e| IdentityError::Malformed(e.to_string())))
            .transpose()?
            .filter(|cn| !cn.trim().is_empty())
            .ok_or(IdentityError::MissingCommonName)?
            .to_string();

        Ok(Self {
            common_name,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: cert.validity().not_before.to_string(),
            not_after: cert.validity().not_after.to_string(),
        })
    }
}
