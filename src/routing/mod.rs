//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → RouteTableHandle::snapshot() (lock-free load)
//!     → router.rs (ordered lookup)
//!     → matcher.rs (evaluate host/path conditions)
//!     → Return: TargetRef or RouteNotFound
//!
//! Route Compilation (startup and every reload):
//!     routes.json
//!     → definition.rs (structured or flat JSON)
//!     → RouteTable::build (patterns and targets validated)
//!     → reload.rs swaps the table atomically
//! ```
//!
//! # Design Decisions
//! - Tables are immutable; reloads replace, never mutate
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (definition order)

pub mod definition;
pub mod matcher;
pub mod reload;
pub mod router;

pub use definition::{RoutesDefinition, RoutesError, TargetRef, TargetScheme};
pub use reload::RouteTableHandle;
pub use router::{RouteNotFound, RouteTable};
