//! Logging and metrics for the gateway.
//!
//! # Data Flow
//! ```text
//! dispatcher, auth flow, route reloads:
//!     → logging.rs (tracing events, request spans keyed by x-request-id)
//!     → metrics.rs (request outcomes, reload results, auth failures)
//!
//! TLS terminator, session store, OCSP cache:
//!     → metrics.rs (session events and size, staple lookups and cache size)
//!
//! Sinks:
//!     → stdout, pretty or JSON
//!     → Prometheus scrape endpoint when enabled
//! ```
//!
//! Recording a metric before `init_metrics` runs is a no-op.

pub mod logging;
pub mod metrics;
