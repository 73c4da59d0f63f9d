//! Route and service lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Store services keyed by exact name
//! - Return matched route/service or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) route scan (acceptable for typical route counts)
//! - O(1) service lookup via HashMap

use std::collections::HashMap;
use std::time::Duration;

use crate::config::schema::{BackendConfig, GatewayConfig, ProtocolKind};
use crate::load_balancer::SelectorKey;
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPattern};

/// A compiled HTTP-facing route.
#[derive(Debug)]
pub struct Route {
    /// Position in the configuration; also the selector key.
    pub index: usize,
    pub pattern: PathPattern,
    pub target: ProtocolKind,
    pub strip_path: bool,
    pub backends: Vec<BackendConfig>,
    pub timeout: Option<Duration>,
    matcher: AndMatcher,
}

impl Route {
    pub fn key(&self) -> SelectorKey {
        SelectorKey::Route(self.index)
    }

    /// Look up a backend definition by address.
    pub fn backend(&self, address: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.address == address)
    }

    fn matches(&self, path: &str, method: &str) -> bool {
        self.matcher.matches(path, method)
    }
}

/// A compiled RPC-facing service.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub protocol: ProtocolKind,
    pub backends: Vec<BackendConfig>,
    pub timeout: Option<Duration>,
    pub max_recv_msg_size: usize,
    pub max_send_msg_size: usize,
}

impl Service {
    pub fn key(&self) -> SelectorKey {
        SelectorKey::Service(self.name.clone())
    }

    pub fn backend(&self, address: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.address == address)
    }
}

/// Read-only registry of routes and services.
#[derive(Debug, Default)]
pub struct Registry {
    routes: Vec<Route>,
    services: HashMap<String, Service>,
}

impl Registry {
    /// Compile routes and services from configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let routes = config
            .http_routes
            .iter()
            .enumerate()
            .map(|(index, rc)| Route {
                index,
                pattern: PathPattern::new(&rc.path),
                target: rc.target_protocol,
                strip_path: rc.strip_path,
                backends: rc.backends.clone(),
                timeout: rc.timeout,
                matcher: AndMatcher::new(vec![
                    Box::new(PathPattern::new(&rc.path)),
                    Box::new(MethodMatcher::new(rc.methods.iter().cloned())),
                ]),
            })
            .collect();

        let services = config
            .grpc_services
            .iter()
            .map(|sc| {
                let service = Service {
                    name: sc.service_name.clone(),
                    protocol: sc.protocol(),
                    backends: sc.backends.clone(),
                    timeout: sc.timeout,
                    max_recv_msg_size: non_zero_or(sc.max_call_recv_msg_size, config.max_call_recv_msg_size),
                    max_send_msg_size: non_zero_or(sc.max_call_send_msg_size, config.max_call_send_msg_size),
                };
                (sc.service_name.clone(), service)
            })
            .collect();

        Self { routes, services }
    }

    /// First route, in declaration order, whose pattern and method list match.
    pub fn match_route(&self, path: &str, method: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path, method))
    }

    /// Exact-name service lookup.
    pub fn match_service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }
}

fn non_zero_or(value: usize, fallback: usize) -> usize {
    if value == 0 {
        fallback
    } else {
        value
    }
}
