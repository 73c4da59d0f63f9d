//! Outbound connection subsystem.
//!
//! # Data Flow
//! ```text
//! Backend address selected
//!     → manager.rs (look up the address slot)
//!         usable connection cached → return it
//!         failed connection cached → close, remove, dial again
//!         nothing cached           → dial (tls.rs options, keep-alive)
//!     → connection.rs (managed handle + observed state)
//!     → Hand off to the RPC client
//! ```
//!
//! # Design Decisions
//! - One connection per address, shared by all calls (HTTP/2 multiplexing)
//! - Dialing is serialized per address, never globally
//! - Calls report transport failures back so the next acquire replaces the
//!   connection

pub mod connection;
pub mod manager;
pub mod tls;

pub use connection::{ConnectionId, ConnectivityState, ManagedConnection};
pub use manager::{ConnectError, ConnectionManager, Connector, TonicConnector};
pub use tls::ClientTlsOptions;
