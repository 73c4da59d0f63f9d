//! gRPC plumbing.
//!
//! # Data Flow
//! ```text
//! Inbound:  HTTP/2 request → server.rs (unframe via codec.rs) → dispatcher
//! Outbound: dispatcher → client.rs (frame via codec.rs) → managed channel
//! ```
//!
//! Messages stay opaque bytes on both sides; only the protocol bridge looks
//! inside them.

pub mod client;
pub mod codec;
pub mod server;

pub use client::{CallError, MessageLimits};
pub use codec::RawCodec;
pub use server::RpcServer;
