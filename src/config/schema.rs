//! Configuration schema definitions.
//!
//! This module defines the configuration document the gateway consumes.
//! All types derive Serde traits for deserialization from config files;
//! field names follow the on-disk document.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default size limit for RPC messages and HTTP bodies (10 MiB).
pub const DEFAULT_MAX_MSG_SIZE: usize = 10 * 1024 * 1024;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interface both listeners bind to.
    pub host: String,

    /// Port of the HTTP listener.
    pub http_port: u16,

    /// Port of the gRPC listener.
    #[serde(alias = "tls_port")]
    pub rpc_port: u16,

    pub run_http_server: bool,

    #[serde(alias = "run_tls_server")]
    pub run_rpc_server: bool,

    /// CORS: answer every origin with `*`.
    pub allow_all_origin: bool,

    /// CORS: origins echoed back when matched exactly.
    pub allowed_origins: Vec<String>,

    /// CORS: allowed request headers (default `Content-Type, Authorization`).
    pub allowed_headers: Vec<String>,

    /// Largest inbound message accepted, in bytes.
    pub max_call_recv_msg_size: usize,

    /// Largest outbound message sent, in bytes.
    pub max_call_send_msg_size: usize,

    /// Bound on establishing a backend connection.
    #[serde(with = "duration_str")]
    pub connection_timeout: Duration,

    /// Per-call deadline when a route or service sets none.
    #[serde(with = "duration_str")]
    pub default_call_timeout: Duration,

    /// Accepted for document compatibility; backends are not probed.
    #[serde(with = "duration_str")]
    pub health_check_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// RPC-facing services, looked up by exact name.
    pub grpc_services: Vec<ServiceConfig>,

    /// HTTP-facing routes, matched in declaration order.
    pub http_routes: Vec<RouteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            rpc_port: 9090,
            run_http_server: true,
            run_rpc_server: false,
            allow_all_origin: false,
            allowed_origins: Vec::new(),
            allowed_headers: Vec::new(),
            max_call_recv_msg_size: DEFAULT_MAX_MSG_SIZE,
            max_call_send_msg_size: DEFAULT_MAX_MSG_SIZE,
            connection_timeout: Duration::from_secs(10),
            default_call_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            grpc_services: Vec::new(),
            http_routes: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn http_bind_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn rpc_bind_address(&self) -> String {
        format!("{}:{}", self.host, self.rpc_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Protocol spoken by a route's or service's backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Textual HTTP/JSON.
    #[default]
    Http,
    /// Structured gRPC.
    Grpc,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolKind::Http => write!(f, "http"),
            ProtocolKind::Grpc => write!(f, "grpc"),
        }
    }
}

/// RPC-facing service definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub service_name: String,

    /// `true` when backends speak gRPC, `false` for foreign HTTP backends.
    #[serde(default = "default_true")]
    pub is_grpc: bool,

    /// Per-service override of the global receive limit (0 = global).
    #[serde(default)]
    pub max_call_recv_msg_size: usize,

    /// Per-service override of the global send limit (0 = global).
    #[serde(default)]
    pub max_call_send_msg_size: usize,

    pub backends: Vec<BackendConfig>,

    /// Per-call deadline for this service.
    #[serde(default, with = "opt_duration_str")]
    pub timeout: Option<Duration>,

    /// Parsed but not acted on: calls are never retried.
    #[serde(default)]
    pub retry_attempts: u32,
}

impl ServiceConfig {
    pub fn protocol(&self) -> ProtocolKind {
        if self.is_grpc {
            ProtocolKind::Grpc
        } else {
            ProtocolKind::Http
        }
    }
}

/// HTTP-facing route definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern: exact prefix, or prefix followed by `*`.
    pub path: String,

    /// Allowed methods; empty means any.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Protocol the route's backends speak.
    #[serde(default)]
    pub target_protocol: ProtocolKind,

    /// Remove the route prefix before forwarding to an HTTP backend.
    #[serde(default)]
    pub strip_path: bool,

    pub backends: Vec<BackendConfig>,

    #[serde(default, with = "opt_duration_str")]
    pub timeout: Option<Duration>,
}

/// Backend server definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// `host:port`, or a base URL for HTTP backends.
    pub address: String,

    /// Accepted for document compatibility; selection is plain round-robin.
    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default)]
    pub tls: bool,

    /// SNI / certificate name override.
    #[serde(default)]
    pub tls_server_name: String,

    #[serde(default)]
    pub tls_skip_verify: bool,

    /// Accepted for document compatibility; backends are not probed.
    #[serde(default)]
    pub health_check_path: String,

    /// Maximum concurrent calls through the gateway (0 = unlimited).
    #[serde(default)]
    pub max_connections: usize,
}

impl BackendConfig {
    /// Plain backend with default options.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            weight: default_weight(),
            tls: false,
            tls_server_name: String::new(),
            tls_skip_verify: false,
            health_check_path: String::new(),
            max_connections: 0,
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Parse `"250ms"`, `"5s"`, `"2m"`, `"1h"`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;

    let secs = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, raw)),
    };

    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration '{}': {}", raw, e))
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration(self) -> Result<Duration, String> {
        match self {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => parse_duration(&text),
        }
    }
}

mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(d)?
            .into_duration()
            .map_err(serde::de::Error::custom)
    }
}

mod opt_duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&format_duration(d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<RawDuration>::deserialize(d)? {
            None => Ok(None),
            Some(RawDuration::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(raw) => raw.into_duration().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("12").unwrap(), Duration::from_secs(12));
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn json_document_with_defaults() {
        let doc = r#"{
            "host": "127.0.0.1",
            "http_port": 8080,
            "tls_port": 9443,
            "run_http_server": true,
            "run_tls_server": true,
            "grpc_services": [
                {"service_name": "billing", "is_grpc": false,
                 "backends": [{"address": "http://10.0.0.1:8000"}], "timeout": "5s"}
            ],
            "http_routes": [
                {"path": "/rpc*", "target_protocol": "grpc",
                 "backends": [{"address": "10.0.0.2:50051", "max_connections": 4}]}
            ]
        }"#;
        let config: GatewayConfig = serde_json::from_str(doc).unwrap();

        assert_eq!(config.rpc_port, 9443);
        assert!(config.run_rpc_server);
        assert_eq!(config.max_call_recv_msg_size, DEFAULT_MAX_MSG_SIZE);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));

        let svc = &config.grpc_services[0];
        assert_eq!(svc.protocol(), ProtocolKind::Http);
        assert_eq!(svc.timeout, Some(Duration::from_secs(5)));

        let route = &config.http_routes[0];
        assert_eq!(route.target_protocol, ProtocolKind::Grpc);
        assert!(route.methods.is_empty());
        assert_eq!(route.timeout, None);
        assert_eq!(route.backends[0].weight, 1);
        assert_eq!(route.backends[0].max_connections, 4);
    }

    #[test]
    fn toml_document() {
        let doc = r#"
            http_port = 8000
            connection_timeout = "750ms"

            [[http_routes]]
            path = "/api"
            methods = ["GET", "POST"]
            strip_path = true
            timeout = 3
            backends = [{ address = "127.0.0.1:3000" }]
        "#;
        let config: GatewayConfig = toml::from_str(doc).unwrap();
        assert_eq!(config.connection_timeout, Duration::from_millis(750));
        assert_eq!(config.http_routes[0].timeout, Some(Duration::from_secs(3)));
        assert!(config.http_routes[0].strip_path);
        assert_eq!(config.http_routes[0].target_protocol, ProtocolKind::Http);
    }
}
