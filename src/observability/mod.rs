//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, servers, connection manager:
//!     → tracing events with structured fields (state, backend, route)
//!     → logging.rs subscriber (pretty or JSON on stdout)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from the HTTP layer into every dispatch event
//! - Dispatch state transitions log at debug, outcomes at info/warn

pub mod logging;
