//! Client TLS options for backend connections.

use tonic::transport::ClientTlsConfig;

use crate::config::schema::BackendConfig;

/// TLS settings used when dialing one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientTlsOptions {
    pub enabled: bool,
    /// Name to verify the certificate against; defaults to the address host.
    pub server_name: Option<String>,
    pub skip_verify: bool,
}

impl ClientTlsOptions {
    pub fn plaintext() -> Self {
        Self::default()
    }

    pub fn from_backend(backend: &BackendConfig) -> Self {
        Self {
            enabled: backend.tls,
            server_name: Some(backend.tls_server_name.clone()).filter(|name| !name.is_empty()),
            skip_verify: backend.tls_skip_verify,
        }
    }

    /// Build the tonic TLS config for a connection to `address`.
    ///
    /// Certificate verification cannot be disabled on the gRPC transport;
    /// `skip_verify` is logged and ignored there.
    pub fn to_tonic(&self, address: &str) -> ClientTlsConfig {
        if self.skip_verify {
            tracing::warn!(
                address = %address,
                "tls_skip_verify is not supported for gRPC backends, verifying certificate"
            );
        }

        let domain = self
            .server_name
            .clone()
            .unwrap_or_else(|| host_of(address).to_string());

        ClientTlsConfig::new().with_native_roots().domain_name(domain)
    }
}

/// Host part of `host:port`, `[v6]:port` or `scheme://host:port/...`.
pub fn host_of(address: &str) -> &str {
    let without_scheme = address.split_once("://").map_or(address, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);

    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    authority.rsplit_once(':').map_or(authority, |(host, _)| host)
}
