//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → dispatcher swaps changed backend lists into the selectors
//! ```
//!
//! # Design Decisions
//! - Routes and services are immutable once loaded; only backend lists reload
//! - Listener settings (bind addresses, CORS, body limit) apply on restart;
//!   a reload that changes them is rejected
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use watcher::ConfigWatcher;
pub use schema::{BackendConfig, GatewayConfig, LogFormat, ProtocolKind, RouteConfig, ServiceConfig};
