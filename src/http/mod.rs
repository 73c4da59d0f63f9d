//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, CORS, health endpoints)
//!     → dispatcher (route, select, relay or translate)
//!     → client.rs (outbound call to an HTTP backend)
//!     → Send to client
//! ```

pub mod client;
pub mod server;

pub use client::BackendHttpClient;
pub use server::{HttpServer, X_REQUEST_ID};
