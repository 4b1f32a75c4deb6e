//! HTTP protocol handling.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper connection, middleware, ConnectionInfo extension)
//!     → dispatcher.rs
//!         /pki/     → auth::ClientCertAuth
//!         otherwise → RouteTable::resolve
//!             unmatched → response.rs (502 "UNMATCHED request: ...")
//!             upgrade   → websocket.rs (byte tunnel)
//!             plain     → request.rs (rewrite) → forward.rs (hyper client)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use dispatcher::Dispatcher;
pub use forward::{Forward, HyperForwarder, ProxyTransportError};
pub use request::X_REQUEST_ID;
pub use server::GatewayServer;
