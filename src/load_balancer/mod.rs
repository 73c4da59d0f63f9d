//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route or service resolved → selector key identified
//!     → BackendSelector (one RoundRobin per key)
//!     → round_robin.rs (rotate through addresses)
//!     → backend.rs (claim an in-flight slot on the chosen address)
//!     → Return address or None
//! ```
//!
//! # Design Decisions
//! - One selector per route/service, created at startup, never removed
//! - Selection is plain round-robin; weights are not applied
//! - An empty list yields `None`, never an error or a panic
//! - Backend lists are replaced by atomic swap, never edited in place

pub mod backend;
pub mod round_robin;

use std::collections::HashMap;

use crate::routing::Registry;
use self::round_robin::RoundRobin;

/// Identifier of one round-robin rotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorKey {
    /// Route, by declaration index.
    Route(usize),
    /// Service, by name.
    Service(String),
}

impl std::fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorKey::Route(i) => write!(f, "route_{}", i),
            SelectorKey::Service(name) => write!(f, "service_{}", name),
        }
    }
}

/// Round-robin selectors for every route and service.
///
/// The key set is fixed at construction; each selector's list can be
/// replaced through `update`.
#[derive(Debug, Default)]
pub struct BackendSelector {
    selectors: HashMap<SelectorKey, RoundRobin>,
}

impl BackendSelector {
    /// Create one selector per route and service in the registry.
    pub fn from_registry(registry: &Registry) -> Self {
        let mut selectors = HashMap::new();
        for route in registry.routes() {
            let addrs = route.backends.iter().map(|b| b.address.clone()).collect();
            selectors.insert(route.key(), RoundRobin::new(addrs));
        }
        for service in registry.services() {
            let addrs = service.backends.iter().map(|b| b.address.clone()).collect();
            selectors.insert(service.key(), RoundRobin::new(addrs));
        }
        Self { selectors }
    }

    /// Next address for `key`; `None` for an empty list or an unknown key.
    pub fn next(&self, key: &SelectorKey) -> Option<String> {
        let selector = self.selectors.get(key)?;
        let address = selector.next();
        if address.is_none() {
            tracing::debug!(key = %key, "Selector has no backends");
        }
        address
    }

    /// Replace the list for `key`. Returns false for an unknown key.
    pub fn update(&self, key: &SelectorKey, backends: Vec<String>) -> bool {
        match self.selectors.get(key) {
            Some(selector) => {
                tracing::info!(key = %key, backends = ?backends, "Backend list replaced");
                selector.update(backends);
                true
            }
            None => false,
        }
    }

    /// Current list for `key`.
    pub fn backends(&self, key: &SelectorKey) -> Option<Vec<String>> {
        self.selectors.get(key).map(RoundRobin::backends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, GatewayConfig, RouteConfig, ServiceConfig};

    fn registry() -> Registry {
        let mut config = GatewayConfig::default();
        config.http_routes.push(RouteConfig {
            path: "/api".into(),
            methods: vec![],
            target_protocol: Default::default(),
            strip_path: false,
            backends: vec![BackendConfig::new("b1"), BackendConfig::new("b2")],
            timeout: None,
        });
        config.grpc_services.push(ServiceConfig {
            service_name: "billing".into(),
            is_grpc: true,
            max_call_recv_msg_size: 0,
            max_call_send_msg_size: 0,
            backends: vec![BackendConfig::new("g1")],
            timeout: None,
            retry_attempts: 0,
        });
        Registry::from_config(&config)
    }

    #[test]
    fn keys_are_independent() {
        let selector = BackendSelector::from_registry(&registry());
        let route = SelectorKey::Route(0);
        let service = SelectorKey::Service("billing".into());

        assert_eq!(selector.next(&route).unwrap(), "b1");
        assert_eq!(selector.next(&service).unwrap(), "g1");
        assert_eq!(selector.next(&route).unwrap(), "b2");
        assert_eq!(selector.next(&service).unwrap(), "g1");
    }

    #[test]
    fn unknown_key() {
        let selector = BackendSelector::from_registry(&registry());
        assert!(selector.next(&SelectorKey::Route(7)).is_none());
        assert!(!selector.update(&SelectorKey::Service("nope".into()), vec![]));
    }

    #[test]
    fn update_replaces_list() {
        let selector = BackendSelector::from_registry(&registry());
        let route = SelectorKey::Route(0);
        selector.next(&route);

        assert!(selector.update(&route, vec!["b3".into()]));
        assert_eq!(selector.backends(&route).unwrap(), vec!["b3".to_string()]);
        assert_eq!(selector.next(&route).unwrap(), "b3");
    }

    #[test]
    fn key_display() {
        assert_eq!(SelectorKey::Route(3).to_string(), "route_3");
        assert_eq!(SelectorKey::Service("billing".into()).to_string(), "service_billing");
    }
}
