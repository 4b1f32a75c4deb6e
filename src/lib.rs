//! yxorp: TLS-terminating HTTP/WebSocket gateway.

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod tls;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::{Gateway, Shutdown};
