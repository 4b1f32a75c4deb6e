//! Client-certificate authentication.
//!
//! # Data Flow
//! ```text
//! GET /pki/ (TLS)
//!     → renegotiate.rs (obtain the verified client chain)
//!     → identity.rs (subject CN and certificate details)
//!     → token.rs (JWT {CN, iat, exp}, signed with the server key)
//!     → flow.rs (JSON body + Set-Cookie: jwt=...; Path=/; Secure)
//! ```

pub mod flow;
pub mod identity;
pub mod renegotiate;
pub mod token;

pub use flow::{AuthFailure, AuthState, AuthSuccess, ClientCertAuth};
pub use identity::PeerIdentity;
pub use renegotiate::{ChallengeError, ClientCertChallenge, HandshakeChallenge};
pub use token::{IdentityClaims, TokenError, TokenIssuer, TokenVerifier};
