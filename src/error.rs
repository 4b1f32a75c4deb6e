//! Startup-path error aggregation.

use crate::auth::TokenError;
use crate::config::ConfigError;
use crate::http::ProxyTransportError;
use crate::net::ListenerError;
use crate::routing::RoutesError;
use crate::tls::TlsError;

/// Anything that stops the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Routes(#[from] RoutesError),

    #[error("identity token signer: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("backend client: {0}")]
    Transport(#[from] ProxyTransportError),

    #[error("routes watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("admin listener: {0}")]
    Admin(#[source] std::io::Error),
}
