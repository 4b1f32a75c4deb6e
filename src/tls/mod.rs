//! TLS termination subsystem.
//!
//! # Data Flow
//! ```text
//! startup:
//!     cert/key/CA files → chain.rs (PEM, chain assembly, client roots)
//!     cipher names      → cipher.rs (vetted ordered suites, versions)
//!     leaf + issuer     → ocsp/ (stapler; disabled without an OCSP URI)
//!     → terminator.rs (ServerConfig with session.rs store)
//!
//! per connection:
//!     TcpStream → TlsTerminator::accept
//!     → ClientHello → staple lookup → handshake → (TlsStream, TlsInfo)
//! ```

pub mod chain;
pub mod cipher;
pub mod ocsp;
pub mod session;
pub mod terminator;

use std::time::Duration;

pub use cipher::{CipherError, CipherPolicy};
pub use session::SessionStore;
pub use terminator::{TlsInfo, TlsTerminator};

use crate::tls::ocsp::OcspError;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("client certificate verifier: {0}")]
    Verifier(String),

    #[error("TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),

    /// Only raised when strict stapling is configured.
    #[error("OCSP stapling failed: {0}")]
    Ocsp(#[from] OcspError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}
