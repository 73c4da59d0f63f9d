//! Dynamic protocol-bridging gateway.
//!
//! Accepts HTTP/JSON and gRPC traffic, resolves each call to a configured
//! route or service, picks a backend round-robin and either relays the call
//! in its own protocol or translates it between JSON and structured RPC
//! values.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;
pub mod rpc;

// Traffic management
pub mod bridge;
pub mod dispatch;
pub mod load_balancer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use dispatch::Dispatcher;
pub use error::{GatewayError, GatewayResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rpc::RpcServer;
