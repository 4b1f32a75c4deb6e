//! Client certificate challenge.
//!
//! Asking an established connection for a client certificate is an async
//! operation that either yields the verified chain, yields nothing (the
//! client declined), or fails. TLS 1.3 has no renegotiation, so the TLS
//! listener requests the certificate during the initial handshake and the
//! challenge resolves from what that handshake verified.

use async_trait::async_trait;
use rustls::pki_types::CertificateDer;

use crate::tls::TlsInfo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    /// The gateway has no CA bundle, so client certificates are never requested.
    #[error("client certificates are not requested on this listener")]
    NotRequested,

    #[error("certificate challenge failed: {0}")]
    Failed(String),
}

/// A way to obtain the peer's certificate chain on an existing connection.
#[async_trait]
pub trait ClientCertChallenge: Send + Sync {
    /// Leaf-first verified chain; empty when the client presented none.
    async fn request_certificate(&self) -> Result<Vec<CertificateDer<'static>>, ChallengeError>;
}

/// Resolves from the chain verified during the TLS handshake.
#[derive(Debug, Clone)]
pub struct HandshakeChallenge {
    peer: Vec<CertificateDer<'static>>,
    requested: bool,
}

impl HandshakeChallenge {
    /// `requested` is whether the listener asked for client certificates.
    pub fn new(info: &TlsInfo, requested: bool) -> Self {
        Self {
            peer: info.peer_certificates.clone(),
            requested,
        }
    }
}

#[async_trait]
impl ClientCertChallenge for HandshakeChallenge {
    async fn request_certificate(&self) -> Result<Vec<CertificateDer<'static>>, ChallengeError> {
        if !self.requested {
            return Err(ChallengeError::NotRequested);
        }
        Ok(self.peer.clone())
    }
}
