//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the dispatcher runtime from a validated configuration
//! - Bind the enabled listeners and start serving
//! - Hand back a handle that stops everything in order
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot bind aborts startup
//! - Listeners start last (traffic only when the runtime is ready)
//! - Ordered shutdown: stop accepting, drain, then close backend connections

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::rpc::RpcServer;

/// Error type for bringing the gateway up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build backend HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },
}

/// A started gateway.
pub struct RunningGateway {
    http_addr: Option<SocketAddr>,
    rpc_addr: Option<SocketAddr>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<io::Result<()>>>,
}

impl RunningGateway {
    /// Address of the HTTP listener, when enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Address of the RPC listener, when enabled.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Stop accepting, give in-flight calls `grace` to finish, then close
    /// every backend connection.
    pub async fn stop(self, grace: Duration) {
        tracing::info!("Shutting down");
        self.shutdown.trigger();
        drain(self.tasks, grace).await;
        self.dispatcher.shutdown();
        tracing::info!("Shutdown complete");
    }
}

/// Build the runtime and start every enabled listener.
pub async fn start(config: GatewayConfig) -> Result<RunningGateway, StartupError> {
    let dispatcher = Arc::new(Dispatcher::new(config.clone())?);
    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    tracing::info!(
        routes = config.http_routes.len(),
        services = config.grpc_services.len(),
        connection_timeout = ?config.connection_timeout,
        default_call_timeout = ?config.default_call_timeout,
        "Configuration loaded"
    );
    for service in &config.grpc_services {
        if service.retry_attempts > 0 {
            tracing::warn!(
                service = %service.service_name,
                retry_attempts = service.retry_attempts,
                "retry_attempts is not supported, calls are sent once"
            );
        }
    }

    let mut http_addr = None;
    if config.run_http_server {
        let listener = bind(&config.http_bind_address()).await?;
        http_addr = Some(listener.local_addr().map_err(|source| StartupError::Bind {
            address: config.http_bind_address(),
            source,
        })?);
        let server = HttpServer::new(&config, dispatcher.clone());
        tasks.push(tokio::spawn(server.run(listener, shutdown.subscribe())));
    }

    let mut rpc_addr = None;
    if config.run_rpc_server {
        let listener = bind(&config.rpc_bind_address()).await?;
        rpc_addr = Some(listener.local_addr().map_err(|source| StartupError::Bind {
            address: config.rpc_bind_address(),
            source,
        })?);
        let server = RpcServer::new(dispatcher.clone());
        tasks.push(tokio::spawn(server.run(listener, shutdown.subscribe())));
    }

    tracing::info!(
        http = ?http_addr,
        rpc = ?rpc_addr,
        "Listening for connections"
    );

    Ok(RunningGateway {
        http_addr,
        rpc_addr,
        dispatcher,
        shutdown,
        tasks,
    })
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}
