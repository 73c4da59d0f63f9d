//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - At least one listener enabled on a non-zero port
//! - Every service and route carries a backend set with addresses
//! - Service names unique (lookup is by exact name)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{BackendConfig, GatewayConfig};

/// A single semantic problem in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one port (http_port or rpc_port) must be specified")]
    NoPort,

    #[error("at least one server (http or rpc) must be enabled")]
    NoServer,

    #[error("service_name is required for grpc_services[{0}]")]
    MissingServiceName(usize),

    #[error("service {0} is declared more than once")]
    DuplicateService(String),

    #[error("path is required for http_routes[{0}]")]
    MissingRoutePath(usize),

    #[error("at least one backend is required for {0}")]
    NoBackends(String),

    #[error("address is required for {owner}, backend[{index}]")]
    MissingAddress { owner: String, index: usize },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http_port == 0 && config.rpc_port == 0 {
        errors.push(ValidationError::NoPort);
    }
    if !config.run_http_server && !config.run_rpc_server {
        errors.push(ValidationError::NoServer);
    }

    let mut seen = HashSet::new();
    for (i, svc) in config.grpc_services.iter().enumerate() {
        if svc.service_name.is_empty() {
            errors.push(ValidationError::MissingServiceName(i));
            continue;
        }
        if !seen.insert(svc.service_name.as_str()) {
            errors.push(ValidationError::DuplicateService(svc.service_name.clone()));
        }
        check_backends(&format!("service {}", svc.service_name), &svc.backends, &mut errors);
    }

    for (i, route) in config.http_routes.iter().enumerate() {
        if route.path.is_empty() {
            errors.push(ValidationError::MissingRoutePath(i));
            continue;
        }
        check_backends(&format!("route {}", route.path), &route.backends, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_backends(owner: &str, backends: &[BackendConfig], errors: &mut Vec<ValidationError>) {
    if backends.is_empty() {
        errors.push(ValidationError::NoBackends(owner.to_string()));
    }
    for (index, backend) in backends.iter().enumerate() {
        if backend.address.trim().is_empty() {
            errors.push(ValidationError::MissingAddress {
                owner: owner.to_string(),
                index,
            });
        }
    }
}
