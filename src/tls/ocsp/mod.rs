//! OCSP stapling.
//!
//! # Data Flow
//! ```text
//! startup:
//!     leaf + issuer → request.rs (CertID, responder URL from AIA)
//!     no OCSP URI → stapling disabled
//!
//! every handshake (before ServerHello):
//!     OcspStapler::staple()
//!     → cache.rs probe (hit → staple)
//!     → miss → responder.rs POST, bounded by timeout, single-flight
//!     → success → store + staple
//!     → failure → no staple (or abort when strict)
//! ```

pub mod cache;
pub mod request;
pub mod responder;

use std::sync::Arc;

use bytes::Bytes;

pub use cache::{OcspCache, OcspEntry};
pub use request::{OcspKey, OcspRequest};
pub use responder::{HttpResponder, OcspResponder};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OcspError {
    /// The certificate has no OCSP URI in its AIA extension.
    #[error("certificate names no OCSP responder")]
    NoResponder,

    #[error("unreadable certificate: {0}")]
    Certificate(String),

    /// Network, protocol or timeout failure.
    #[error("OCSP responder unavailable: {0}")]
    Unavailable(String),

    /// The responder answered with a non-successful status.
    #[error("OCSP responder returned {0}")]
    ResponderError(String),
}

/// Supplies the staple for the server certificate.
pub struct OcspStapler {
    cache: Arc<OcspCache>,
    request: Option<OcspRequest>,
    strict: bool,
}

impl OcspStapler {
    /// Prepare stapling for `leaf`. Without an issuer or responder URI
    /// stapling is disabled, which is logged and is not an error.
    pub fn new(
        cache: Arc<OcspCache>,
        leaf: &[u8],
        issuer: Option<&[u8]>,
        strict: bool,
    ) -> Result<Self, OcspError> {
        let request = match issuer {
            None => {
                tracing::info!("No issuer certificate available, disabling OCSP stapling");
                None
            }
            Some(issuer) => match OcspRequest::for_certificate(leaf, issuer) {
                Ok(request) => {
                    tracing::info!(url = %request.responder_url, key = %request.key, "OCSP stapling enabled");
                    Some(request)
                }
                Err(OcspError::NoResponder) => {
                    tracing::info!("No OCSP URI in certificate, disabling OCSP stapling");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        Ok(Self { cache, request, strict })
    }

    pub fn is_enabled(&self) -> bool {
        self.request.is_some()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn cache(&self) -> &Arc<OcspCache> {
        &self.cache
    }

    /// The response to staple, if any. Errors only in strict mode.
    pub async fn staple(&self) -> Result<Option<Bytes>, OcspError> {
        let Some(request) = &self.request else {
            return Ok(None);
        };

        match self.cache.lookup(request).await {
            Ok(entry) => Ok(Some(entry.response)),
            Err(e) if self.strict => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "OCSP staple unavailable, continuing without");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::ocsp::request::tests::leaf_and_issuer;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Down;

    #[async_trait]
    impl OcspResponder for Down {
        async fn fetch(&self, _url: &str, _request: &[u8]) -> Result<Bytes, OcspError> {
            Err(OcspError::Unavailable("connection refused".into()))
        }
    }

    fn cache() -> Arc<OcspCache> {
        Arc::new(OcspCache::new(Arc::new(Down), Duration::from_secs(1), None))
    }

    #[tokio::test]
    async fn failure_degrades_to_no_staple() {
        let (leaf, issuer) = leaf_and_issuer(Some("http://ocsp.test/"));
        let stapler = OcspStapler::new(cache(), &leaf, Some(&issuer), false).unwrap();
        assert!(stapler.is_enabled());
        assert_eq!(stapler.staple().await.unwrap(), None);
    }

    #[tokio::test]
    async fn strict_mode_surfaces_failure() {
        let (leaf, issuer) = leaf_and_issuer(Some("http://ocsp.test/"));
        let stapler = OcspStapler::new(cache(), &leaf, Some(&issuer), true).unwrap();
        assert!(matches!(stapler.staple().await, Err(OcspError::Unavailable(_))));
    }

    #[tokio::test]
    async fn no_uri_disables_stapling() {
        let (leaf, issuer) = leaf_and_issuer(None);
        let stapler = OcspStapler::new(cache(), &leaf, Some(&issuer), true).unwrap();
        assert!(!stapler.is_enabled());
        assert_eq!(stapler.staple().await.unwrap(), None);

        let stapler = OcspStapler::new(cache(), &leaf, None, true).unwrap();
        assert!(!stapler.is_enabled());
    }
}
