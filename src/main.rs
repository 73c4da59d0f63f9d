//! Dynamic Gateway
//!
//! A protocol-bridging gateway built with Tokio, Axum and Tonic.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                        GATEWAY                           │
//!   HTTP/JSON caller  │  ┌─────────────┐                                         │
//!   ──────────────────┼─▶│ http server │──┐                                      │
//!                     │  └─────────────┘  │   ┌────────────┐   ┌──────────────┐  │
//!                     │                   ├──▶│ dispatcher │──▶│   registry   │  │
//!   gRPC caller       │  ┌─────────────┐  │   └─────┬──────┘   │ route/service│  │
//!   ──────────────────┼─▶│ rpc server  │──┘         │          └──────────────┘  │
//!                     │  └─────────────┘            ▼                            │
//!                     │                   ┌──────────────────┐                   │
//!                     │                   │ backend selector │ round-robin       │
//!                     │                   └────────┬─────────┘                   │
//!                     │                            ▼                             │
//!                     │   ┌──────────────┐  ┌──────────────────┐                 │
//!                     │   │   protocol   │◀▶│ connection mgr / │─────────────────┼──▶ Backends
//!                     │   │    bridge    │  │   http client    │                 │    (HTTP, gRPC)
//!                     │   └──────────────┘  └──────────────────┘                 │
//!                     │                                                          │
//!                     │  config + watcher · logging · deadlines · lifecycle      │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use dynamic_gateway::config::{load_config, ConfigWatcher};
use dynamic_gateway::lifecycle::{self, signals};
use dynamic_gateway::observability::logging;

/// How long in-flight calls may run after a termination signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "dynamic-gateway")]
#[command(about = "Protocol-bridging HTTP/gRPC gateway", long_about = None)]
struct Cli {
    /// Configuration file (.json, otherwise TOML).
    #[arg(short, long, default_value = "configs/config.json")]
    config: PathBuf,

    /// Do not reload backend lists when the configuration file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .map_err(|e| format!("failed to load {}: {}", cli.config.display(), e))?;
    logging::init(&config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "dynamic-gateway starting"
    );

    let gateway = lifecycle::start(config).await?;

    // Keep the watcher alive until shutdown.
    let _watcher = if cli.no_watch {
        None
    } else {
        let (watcher, mut updates) = ConfigWatcher::new(&cli.config);
        let dispatcher = Arc::clone(gateway.dispatcher());
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                dispatcher.apply_topology(&config);
            }
        });
        match watcher.run() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start, reload disabled");
                None
            }
        }
    };

    let signal = signals::wait_for_termination().await;
    tracing::info!(signal, "Shutdown signal received");

    gateway.stop(SHUTDOWN_GRACE).await;
    Ok(())
}
