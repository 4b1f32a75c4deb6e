//! Client-certificate authentication flow.
//!
//! # States
//! ```text
//! AwaitingCertificate ──challenge ok──▶ CertificateReceived ──CN ok──▶ Issuing ──▶ Responded
//!        │                                   │                          │
//!        └── error / timeout / plaintext ────┴── none / malformed ──────┴── signing ──▶ Failed
//! ```
//! Every path ends in a response; nothing is left pending.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::identity::{IdentityError, PeerIdentity};
use crate::auth::renegotiate::{ChallengeError, ClientCertChallenge};
use crate::auth::token::{IdentityClaims, TokenError, TokenIssuer};
use crate::observability::metrics;
use crate::tls::TlsInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingCertificate,
    CertificateReceived,
    Issuing,
    Responded,
    Failed,
}

/// Terminal failures of the flow, each with a caller-visible response.
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    /// Plaintext connection: there is no TLS session to challenge.
    #[error("client certificate authentication requires TLS")]
    NotEncrypted,

    #[error(transparent)]
    Renegotiation(#[from] ChallengeError),

    #[error("timed out waiting for a client certificate")]
    Timeout,

    #[error("no client certificate presented")]
    NoPeerCertificate,

    #[error(transparent)]
    MalformedPeerCertificate(#[from] IdentityError),

    #[error("failed to sign token: {0}")]
    Signing(#[from] TokenError),
}

impl AuthFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthFailure::NotEncrypted | AuthFailure::Renegotiation(_) | AuthFailure::Timeout => StatusCode::FORBIDDEN,
            AuthFailure::NoPeerCertificate => StatusCode::UNAUTHORIZED,
            AuthFailure::MalformedPeerCertificate(_) => StatusCode::BAD_REQUEST,
            AuthFailure::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::NotEncrypted => "not_encrypted",
            AuthFailure::Renegotiation(_) => "renegotiation",
            AuthFailure::Timeout => "timeout",
            AuthFailure::NoPeerCertificate => "no_certificate",
            AuthFailure::MalformedPeerCertificate(_) => "malformed_certificate",
            AuthFailure::Signing(_) => "signing",
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let body = format!("{} {}\n\n{}\n", self.status().as_u16(), self.status().canonical_reason().unwrap_or(""), self);
        (self.status(), [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}

/// Body of a successful authentication.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSuccess {
    pub token: String,
    pub cipher: String,
    pub protocol: String,
    pub peer_certificate: PeerIdentity,
    #[serde(skip)]
    pub claims: IdentityClaims,
    #[serde(skip)]
    pub cookie: String,
}

impl IntoResponse for AuthSuccess {
    fn into_response(self) -> Response {
        let cookie = HeaderValue::from_str(&self.cookie);
        let mut response = Json(&self).into_response();
        match cookie {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Issued token is not a valid header value"),
        }
        response
    }
}

/// Runs the flow for one request.
pub struct ClientCertAuth {
    issuer: TokenIssuer,
    cookie_name: String,
    timeout: Duration,
}

impl ClientCertAuth {
    pub fn new(issuer: TokenIssuer, cookie_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            issuer,
            cookie_name: cookie_name.into(),
            timeout,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn cookie(&self, token: &str) -> String {
        format!("{}={}; Path=/; Secure", self.cookie_name, token)
    }

    /// Authenticate the peer of a connection. `tls` is `None` on plaintext.
    pub async fn authenticate(
        &self,
        tls: Option<&TlsInfo>,
        challenge: &dyn ClientCertChallenge,
    ) -> Result<AuthSuccess, AuthFailure> {
        let result = self.run(tls, challenge).await;
        match &result {
            Ok(success) => {
                metrics::record_token_issued();
                tracing::info!(cn = %success.claims.cn, exp = success.claims.exp, state = ?AuthState::Responded, "Identity token issued");
            }
            Err(failure) => {
                metrics::record_auth_failure(failure.reason());
                tracing::warn!(error = %failure, state = ?AuthState::Failed, "Client certificate authentication failed");
            }
        }
        result
    }

    async fn run(&self, tls: Option<&TlsInfo>, challenge: &dyn ClientCertChallenge) -> Result<AuthSuccess, AuthFailure> {
        let tls = tls.ok_or(AuthFailure::NotEncrypted)?;
        tracing::debug!(state = ?AuthState::AwaitingCertificate, "Requesting client certificate");

        let chain = tokio::time::timeout(self.timeout, challenge.request_certificate())
            .await
            .map_err(|_| AuthFailure::Timeout)??;

        let leaf = chain.first().ok_or(AuthFailure::NoPeerCertificate)?;
        tracing::debug!(state = ?AuthState::CertificateReceived, chain_len = chain.len(), "Client certificate received");

        let identity = PeerIdentity::from_der(leaf.as_ref())?;
        tracing::debug!(state = ?AuthState::Issuing, cn = %identity.common_name, "Issuing identity token");

        let (token, claims) = self.issuer.issue(&identity.common_name)?;

        Ok(AuthSuccess {
            cookie: self.cookie(&token),
            token,
            cipher: tls.cipher.clone(),
            protocol: tls.protocol.clone(),
            peer_certificate: identity,
            claims,
        })
    }
}
