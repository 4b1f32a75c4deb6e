//! TLS termination.
//!
//! # Responsibilities
//! - Build rustls server configs from the chain, key and cipher policy
//! - Resolve the OCSP staple before the handshake proceeds
//! - Plug the bounded session store in for resumption
//! - Request (and verify) client certificates when a CA bundle is configured
//!
//! # Design Decisions
//! - The ClientHello is read first (`LazyConfigAcceptor`), then the staple
//!   lookup is awaited, then the handshake continues with a config carrying
//!   that staple; the handshake cannot complete before the lookup resolves
//! - One config per distinct staple, swapped in when the staple changes
//! - Handshake plus staple lookup is bounded by a timeout

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{Acceptor, ServerConnection, WebPkiClientVerifier};
use rustls::{ServerConfig, SupportedProtocolVersion};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;

use crate::config::{OcspConfig, TlsConfig};
use crate::tls::chain::{load_private_key, CertificateChain};
use crate::tls::cipher::{suite_name, CipherPolicy};
use crate::tls::ocsp::{HttpResponder, OcspCache, OcspStapler};
use crate::tls::session::SessionStore;
use crate::tls::TlsError;

/// What the application layer learns about a TLS connection.
#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    /// e.g. `TLSv1_3`
    pub protocol: String,
    /// e.g. `TLS13_AES_256_GCM_SHA384`
    pub cipher: String,
    pub sni: Option<String>,
    /// Verified client chain, leaf first. Empty when none was presented.
    pub peer_certificates: Vec<CertificateDer<'static>>,
}

impl TlsInfo {
    pub fn from_connection(conn: &ServerConnection, sni: Option<String>) -> Self {
        Self {
            protocol: conn
                .protocol_version()
                .map(|v| format!("{:?}", v))
                .unwrap_or_default(),
            cipher: conn
                .negotiated_cipher_suite()
                .map(|s| suite_name(&s))
                .unwrap_or_default(),
            sni,
            peer_certificates: conn.peer_certificates().map(|c| c.to_vec()).unwrap_or_default(),
        }
    }
}

struct StapledConfig {
    staple: Bytes,
    config: Arc<ServerConfig>,
}

/// Everything a `ServerConfig` is built from.
struct ConfigParts {
    chain: CertificateChain,
    key: PrivateKeyDer<'static>,
    provider: Arc<CryptoProvider>,
    versions: Vec<&'static SupportedProtocolVersion>,
    verifier: Option<Arc<dyn ClientCertVerifier>>,
    sessions: Arc<SessionStore>,
}

impl ConfigParts {
    fn build(&self, ocsp: Vec<u8>) -> Result<Arc<ServerConfig>, TlsError> {
        let builder =
            ServerConfig::builder_with_provider(self.provider.clone()).with_protocol_versions(&self.versions)?;
        let builder = match &self.verifier {
            Some(verifier) => builder.with_client_cert_verifier(verifier.clone()),
            None => builder.with_no_client_auth(),
        };

        let mut config = builder.with_single_cert_with_ocsp(self.chain.served.clone(), self.key.clone_key(), ocsp)?;
        config.session_storage = self.sessions.clone();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

pub struct TlsTerminator {
    parts: ConfigParts,
    policy: CipherPolicy,
    stapler: Option<OcspStapler>,
    unstapled: Arc<ServerConfig>,
    stapled: ArcSwapOption<StapledConfig>,
    handshake_timeout: Duration,
}

impl TlsTerminator {
    /// Load certificates and keys from disk and prepare stapling.
    pub fn from_config(tls: &TlsConfig, ocsp: &OcspConfig, handshake_timeout: Duration) -> Result<Self, TlsError> {
        let chain = CertificateChain::load(Path::new(&tls.cert_path), tls.ca_path.as_deref().map(Path::new))?;
        let key = load_private_key(Path::new(&tls.key_path))?;
        let policy = CipherPolicy::from_names(&tls.cipher_suites)?;
        let sessions = Arc::new(SessionStore::new(
            tls.session_capacity,
            Duration::from_secs(tls.session_ttl_secs),
        ));

        let stapler = if ocsp.enabled {
            let cache = Arc::new(OcspCache::new(
                Arc::new(HttpResponder::new()),
                Duration::from_secs(ocsp.fetch_timeout_secs),
                ocsp.max_age_secs.map(Duration::from_secs),
            ));
            let issuer = chain.issuer.as_ref().map(|c| c.as_ref());
            Some(OcspStapler::new(cache, chain.leaf().as_ref(), issuer, ocsp.strict)?)
        } else {
            None
        };

        Self::new(chain, key, policy, sessions, stapler, handshake_timeout)
    }

    pub fn new(
        chain: CertificateChain,
        key: PrivateKeyDer<'static>,
        policy: CipherPolicy,
        sessions: Arc<SessionStore>,
        stapler: Option<OcspStapler>,
        handshake_timeout: Duration,
    ) -> Result<Self, TlsError> {
        let provider = policy.provider();
        let versions = policy.protocol_versions();

        let verifier = match chain.client_roots()? {
            Some(roots) => Some(
                WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                    .allow_unauthenticated()
                    .build()
                    .map_err(|e| TlsError::Verifier(e.to_string()))?,
            ),
            None => None,
        };

        let parts = ConfigParts {
            chain,
            key,
            provider,
            versions,
            verifier,
            sessions,
        };
        let unstapled = parts.build(Vec::new())?;

        tracing::info!(
            ciphers = ?policy.names(),
            client_auth = parts.verifier.is_some(),
            stapling = stapler.as_ref().map(|s| s.is_enabled()).unwrap_or(false),
            "TLS terminator ready"
        );

        Ok(Self {
            parts,
            policy,
            stapler,
            unstapled,
            stapled: ArcSwapOption::empty(),
            handshake_timeout,
        })
    }

    /// The config for the next handshake, carrying the current staple.
    async fn handshake_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let Some(stapler) = &self.stapler else {
            return Ok(self.unstapled.clone());
        };

        let Some(staple) = stapler.staple().await? else {
            return Ok(self.unstapled.clone());
        };

        if let Some(current) = self.stapled.load_full() {
            if current.staple == staple {
                return Ok(current.config.clone());
            }
        }

        let config = self.parts.build(staple.to_vec())?;
        self.stapled.store(Some(Arc::new(StapledConfig {
            staple,
            config: config.clone(),
        })));
        Ok(config)
    }

    /// Run the server side of a handshake on `stream`.
    pub async fn accept<IO>(&self, stream: IO) -> Result<(TlsStream<IO>, TlsInfo), TlsError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let handshake = async {
            let start = LazyConfigAcceptor::new(Acceptor::default(), stream)
                .await
                .map_err(TlsError::Handshake)?;
            let sni = start.client_hello().server_name().map(str::to_string);

            let config = self.handshake_config().await?;
            let stream = start.into_stream(config).await.map_err(TlsError::Handshake)?;

            let info = TlsInfo::from_connection(stream.get_ref().1, sni);
            Ok((stream, info))
        };

        match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(TlsError::HandshakeTimeout(self.handshake_timeout)),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.parts.sessions
    }

    pub fn stapler(&self) -> Option<&OcspStapler> {
        self.stapler.as_ref()
    }

    pub fn policy(&self) -> &CipherPolicy {
        &self.policy
    }

    pub fn requests_client_certificates(&self) -> bool {
        self.parts.verifier.is_some()
    }
}
