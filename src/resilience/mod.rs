//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatched call:
//!     → timeouts.rs (one deadline around selection, connection and call)
//!     → On expiry: inner future dropped, DeadlineExceeded returned
//! ```
//!
//! # Design Decisions
//! - Every dispatched call has a deadline
//! - No retries: a failed call is reported once, as is

pub mod timeouts;

pub use timeouts::{parse_grpc_timeout, with_deadline};
