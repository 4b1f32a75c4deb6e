//! Network layer.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, shared connection limit)
//!     → tls::TlsTerminator (HTTPS listener only)
//!     → connection.rs (ConnectionInfo, lifetime tracking)
//!     → Hand off to HTTP layer
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionLease, ConnectionTracker};
pub use listener::{ConnectionLimit, ConnectionPermit, Listener, ListenerError};
