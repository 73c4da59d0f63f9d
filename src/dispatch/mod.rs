//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! RECEIVED
//!     → ROUTE_RESOLVED      (registry: route by path+method, service by name)
//!     → BACKEND_SELECTED    (selector: round-robin; in-flight cap claimed)
//!     → CONNECTION_ACQUIRED (connection manager, RPC backends only)
//!     → [BRIDGED]           (protocol bridge, cross-protocol calls only)
//!     → CALL_SENT
//!     → RESPONSE_RECEIVED
//!     → [BRIDGED_BACK]
//!     → RESPONDED
//! Any state → FAILED(GatewayError)
//! ```
//!
//! # Design Decisions
//! - One deadline covers everything after route resolution
//! - Dropping a call future (deadline, caller gone) cancels the outbound call
//! - All shared state lives in `GatewayRuntime`; the dispatcher holds no
//!   other state and nothing is global
//! - Failures are reported once; calls are never retried

mod from_http;
mod from_rpc;

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tonic::transport::Channel;

use crate::config::{BackendConfig, GatewayConfig};
use crate::error::{ApplicationStatus, GatewayError, GatewayResult};
use crate::http::client::BackendHttpClient;
use crate::load_balancer::backend::{BackendCallGuard, InFlightTracker};
use crate::load_balancer::{BackendSelector, SelectorKey};
use crate::net::{ConnectionManager, ManagedConnection, TonicConnector};
use crate::routing::Registry;
use crate::rpc::client::{self as rpc_client, CallError, MessageLimits};

/// Every component a dispatched call touches.
pub struct GatewayRuntime {
    pub config: ArcSwap<GatewayConfig>,
    pub registry: ArcSwap<Registry>,
    pub selector: BackendSelector,
    pub connections: ConnectionManager<TonicConnector>,
    pub in_flight: InFlightTracker,
    pub http: BackendHttpClient,
}

impl GatewayRuntime {
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let registry = Registry::from_config(&config);
        let selector = BackendSelector::from_registry(&registry);
        let connections = ConnectionManager::new(
            TonicConnector::new(config.connection_timeout),
            config.connection_timeout,
        );
        let http = BackendHttpClient::new(config.connection_timeout)?;

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            registry: ArcSwap::from_pointee(registry),
            selector,
            connections,
            in_flight: InFlightTracker::new(),
            http,
        })
    }
}

/// Drives each inbound call from receipt to response.
pub struct Dispatcher {
    runtime: GatewayRuntime,
}

impl Dispatcher {
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            runtime: GatewayRuntime::new(config)?,
        })
    }

    pub fn runtime(&self) -> &GatewayRuntime {
        &self.runtime
    }

    /// Message limits for calls into `service`, falling back to the global
    /// limits for unknown names.
    pub fn rpc_limits(&self, service: &str) -> MessageLimits {
        if let Some(svc) = self.runtime.registry.load().match_service(service) {
            return MessageLimits {
                max_recv: svc.max_recv_msg_size,
                max_send: svc.max_send_msg_size,
            };
        }
        global_limits(&self.runtime.config.load())
    }

    /// Apply a reloaded configuration.
    ///
    /// Only backend lists and per-backend options are hot-swapped. When the
    /// set of routes or services changed, or a setting baked into the
    /// listeners at startup changed, nothing is applied and `false` is
    /// returned.
    pub fn apply_topology(&self, config: &GatewayConfig) -> bool {
        let current = self.runtime.config.load();
        if !same_layout(&current, config) {
            tracing::warn!("Route or service layout changed, restart required to apply it");
            return false;
        }
        if !same_listeners(&current, config) {
            tracing::warn!("Listener settings changed, restart required to apply them");
            return false;
        }

        // Registry first, so a freshly rotated address always resolves to
        // its new backend options.
        let registry = Arc::new(Registry::from_config(config));
        self.runtime.registry.store(Arc::clone(&registry));
        for route in registry.routes() {
            self.refresh_selector(&route.key(), addresses(&route.backends));
        }
        for service in registry.services() {
            self.refresh_selector(&service.key(), addresses(&service.backends));
        }

        self.runtime.config.store(Arc::new(config.clone()));
        tracing::info!("Backend topology reloaded");
        true
    }

    /// Swap the list for `key` only when it differs; an unchanged list keeps
    /// its rotation position.
    fn refresh_selector(&self, key: &SelectorKey, next: Vec<String>) {
        if self.runtime.selector.backends(key).as_ref() != Some(&next) {
            self.runtime.selector.update(key, next);
        }
    }

    /// Connectivity state of every cached backend connection.
    pub fn connection_health(&self) -> BTreeMap<String, String> {
        self.runtime.connections.health_snapshot()
    }

    /// Close all backend connections.
    pub fn shutdown(&self) {
        self.runtime.connections.close_all();
    }

    /// Pick the next backend for `key` and claim an in-flight slot on it.
    fn select_backend(
        &self,
        key: &SelectorKey,
        lookup: impl Fn(&str) -> Option<BackendConfig>,
    ) -> GatewayResult<(BackendConfig, BackendCallGuard)> {
        let address = self
            .runtime
            .selector
            .next(key)
            .ok_or_else(|| GatewayError::NoBackendAvailable {
                key: key.to_string(),
            })?;
        let backend = lookup(&address).unwrap_or_else(|| BackendConfig::new(address.clone()));

        let guard = self
            .runtime
            .in_flight
            .try_acquire(&address, backend.max_connections)
            .ok_or_else(|| GatewayError::BackendSaturated {
                address: address.clone(),
            })?;

        tracing::debug!(
            state = "BACKEND_SELECTED",
            key = %key,
            backend = %address,
            active_calls = guard.active_calls(),
            "Backend selected"
        );
        Ok((backend, guard))
    }

    /// Send one unary call on a managed connection and fold the outcome
    /// back into the connection's state.
    async fn invoke(
        &self,
        connection: &ManagedConnection<Channel>,
        service: &str,
        method: &str,
        request: tonic::Request<bytes::Bytes>,
        limits: MessageLimits,
    ) -> GatewayResult<tonic::Response<bytes::Bytes>> {
        tracing::debug!(
            state = "CALL_SENT",
            backend = %connection.address(),
            connection_id = connection.id().as_u64(),
            service = %service,
            method = %method,
            "Calling RPC backend"
        );

        match rpc_client::unary(connection.handle().clone(), service, method, request, limits).await {
            Ok(response) => {
                connection.mark_ready();
                tracing::debug!(state = "RESPONSE_RECEIVED", backend = %connection.address(), "RPC backend answered");
                Ok(response)
            }
            Err(CallError::Status(status)) => {
                connection.mark_ready();
                tracing::debug!(
                    backend = %connection.address(),
                    code = ?status.code(),
                    "RPC backend returned an error status"
                );
                Err(GatewayError::BackendApplication {
                    status: ApplicationStatus::Rpc(status.code()),
                    message: status.message().to_string(),
                })
            }
            Err(CallError::Transport(reason)) => {
                connection.mark_failed();
                tracing::warn!(
                    backend = %connection.address(),
                    connection_id = connection.id().as_u64(),
                    error = %reason,
                    "Backend connection failed during call"
                );
                Err(GatewayError::BackendUnreachable {
                    address: connection.address().to_string(),
                    reason,
                })
            }
        }
    }
}

fn global_limits(config: &GatewayConfig) -> MessageLimits {
    MessageLimits {
        max_recv: config.max_call_recv_msg_size,
        max_send: config.max_call_send_msg_size,
    }
}

fn addresses(backends: &[BackendConfig]) -> Vec<String> {
    backends.iter().map(|b| b.address.clone()).collect()
}

/// Routes match in the same order with the same patterns and targets, and
/// the same services exist with the same protocols.
fn same_layout(current: &GatewayConfig, next: &GatewayConfig) -> bool {
    let routes_match = current.http_routes.len() == next.http_routes.len()
        && current
            .http_routes
            .iter()
            .zip(&next.http_routes)
            .all(|(a, b)| {
                a.path == b.path && a.methods == b.methods && a.target_protocol == b.target_protocol
            });

    let mut current_services: Vec<_> = current
        .grpc_services
        .iter()
        .map(|s| (s.service_name.as_str(), s.is_grpc))
        .collect();
    let mut next_services: Vec<_> = next
        .grpc_services
        .iter()
        .map(|s| (s.service_name.as_str(), s.is_grpc))
        .collect();
    current_services.sort_unstable();
    next_services.sort_unstable();

    routes_match && current_services == next_services
}

/// Settings the HTTP and RPC listeners read once when they are built.
fn same_listeners(current: &GatewayConfig, next: &GatewayConfig) -> bool {
    current.http_bind_address() == next.http_bind_address()
        && current.rpc_bind_address() == next.rpc_bind_address()
        && current.run_http_server == next.run_http_server
        && current.run_rpc_server == next.run_rpc_server
        && current.allow_all_origin == next.allow_all_origin
        && current.allowed_origins == next.allowed_origins
        && current.allowed_headers == next.allowed_headers
        && current.max_call_recv_msg_size == next.max_call_recv_msg_size
}
