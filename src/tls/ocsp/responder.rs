//! Transport to OCSP responders.

use async_trait::async_trait;
use bytes::Bytes;

use crate::tls::ocsp::OcspError;

/// Something that can answer an OCSP request.
#[async_trait]
pub trait OcspResponder: Send + Sync {
    /// POST `request` (DER) to `url` and return the raw response body.
    async fn fetch(&self, url: &str, request: &[u8]) -> Result<Bytes, OcspError>;
}

/// OCSP over HTTP POST (RFC 6960 appendix A).
#[derive(Debug, Clone)]
pub struct HttpResponder {
    client: reqwest::Client,
}

impl HttpResponder {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcspResponder for HttpResponder {
    async fn fetch(&self, url: &str, request: &[u8]) -> Result<Bytes, OcspError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/ocsp-request")
            .header(reqwest::header::ACCEPT, "application/ocsp-response")
            .body(request.to_vec())
            .send()
            .await
            .map_err(|e| OcspError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OcspError::Unavailable(format!("HTTP {}", status)));
        }

        response.bytes().await.map_err(|e| OcspError::Unavailable(e.to_string()))
    }
}
