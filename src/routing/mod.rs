//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound HTTP call (path, method)
//!     → registry.rs (route lookup, declaration order)
//!     → matcher.rs (evaluate path pattern AND method list)
//!     → Return: matched Route or None
//!
//! Inbound RPC call (service name)
//!     → registry.rs (exact-name service lookup)
//!     → Return: matched Service or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins in declaration order; no specificity ranking

pub mod matcher;
pub mod registry;

pub use registry::{Registry, Route, Service};
