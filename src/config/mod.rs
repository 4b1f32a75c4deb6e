//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! proxyconf.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared by value/Arc to all subsystems
//!
//! routes.json is separate and hot-reloaded:
//!     watcher.rs detects change
//!     → routing::reload rebuilds the RouteTable
//!     → atomic swap; failures keep the previous table
//! ```
//!
//! # Design Decisions
//! - Gateway config is loaded once; only routes reload at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuthConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    OcspConfig, RoutesConfig, TimeoutConfig, TlsConfig, TokenAlgorithm,
};
pub use watcher::RoutesWatcher;
