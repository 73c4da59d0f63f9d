//! Calls arriving on the RPC listener.

use axum::http::{Method, Request};
use bytes::Bytes;
use tonic::{Extensions, Response};

use super::Dispatcher;
use crate::bridge::{self, Metadata, RpcStruct};
use crate::config::{BackendConfig, GatewayConfig, ProtocolKind};
use crate::error::{ApplicationStatus, GatewayError, GatewayResult};
use crate::http::client::backend_uri;
use crate::net::ClientTlsOptions;
use crate::resilience::{parse_grpc_timeout, with_deadline};
use crate::routing::Service;

impl Dispatcher {
    /// Dispatch one unary RPC: relay it to an RPC backend or translate it
    /// into a JSON POST on a foreign HTTP backend.
    pub async fn dispatch_rpc(
        &self,
        service: &str,
        method: &str,
        request: tonic::Request<Bytes>,
    ) -> GatewayResult<Response<Bytes>> {
        let registry = self.runtime.registry.load_full();
        let config = self.runtime.config.load_full();

        let target = registry
            .match_service(service)
            .ok_or_else(|| GatewayError::ServiceNotFound {
                name: service.to_string(),
            })?;

        tracing::debug!(
            state = "ROUTE_RESOLVED",
            service = %service,
            method = %method,
            protocol = %target.protocol,
            "Service matched"
        );

        let mut deadline = target.timeout.unwrap_or(config.default_call_timeout);
        let caller_deadline = request
            .metadata()
            .get("grpc-timeout")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout);
        if let Some(caller_deadline) = caller_deadline {
            deadline = deadline.min(caller_deadline);
        }

        with_deadline(deadline, self.forward_rpc(target, method, &config, request)).await
    }

    async fn forward_rpc(
        &self,
        service: &Service,
        method: &str,
        config: &GatewayConfig,
        request: tonic::Request<Bytes>,
    ) -> GatewayResult<Response<Bytes>> {
        let (backend, _guard) =
            self.select_backend(&service.key(), |addr| service.backend(addr).cloned())?;

        match service.protocol {
            ProtocolKind::Grpc => self.relay_rpc(service, method, &backend, request).await,
            ProtocolKind::Http => {
                self.rpc_to_http(service, method, &backend, config, request)
                    .await
            }
        }
    }

    /// Forward the call's bytes unchanged to an RPC backend.
    async fn relay_rpc(
        &self,
        service: &Service,
        method: &str,
        backend: &BackendConfig,
        request: tonic::Request<Bytes>,
    ) -> GatewayResult<Response<Bytes>> {
        let (metadata, _, payload) = request.into_parts();
        let metadata = Metadata::from_rpc(&metadata)
            .forwardable()
            .to_rpc()
            .map_err(GatewayError::malformed_caller)?;
        let call = tonic::Request::from_parts(metadata, Extensions::default(), payload);

        let connection = self
            .runtime
            .connections
            .acquire(&backend.address, &ClientTlsOptions::from_backend(backend))
            .await?;
        tracing::debug!(
            state = "CONNECTION_ACQUIRED",
            backend = %backend.address,
            connection_id = connection.id().as_u64(),
            "Connection ready"
        );

        let limits = self.rpc_limits(&service.name);
        let response = self
            .invoke(&connection, &service.name, method, call, limits)
            .await?;

        let (metadata, payload, _) = response.into_parts();
        let metadata = Metadata::from_rpc(&metadata)
            .forwardable()
            .to_rpc()
            .map_err(GatewayError::malformed_backend)?;
        Ok(Response::from_parts(metadata, payload, Extensions::default()))
    }

    /// Translate the structured call into `POST {base}/{service}/{method}`
    /// with a JSON body, and the JSON reply back into a structured message.
    async fn rpc_to_http(
        &self,
        service: &Service,
        method: &str,
        backend: &BackendConfig,
        config: &GatewayConfig,
        request: tonic::Request<Bytes>,
    ) -> GatewayResult<Response<Bytes>> {
        let (metadata, _, payload) = request.into_parts();
        let document = RpcStruct::decode(&payload).map_err(GatewayError::malformed_caller)?;
        let (body, headers) =
            bridge::structured_to_textual(&document, &Metadata::from_rpc(&metadata).forwardable())
                .map_err(GatewayError::malformed_caller)?;
        tracing::debug!(state = "BRIDGED", service = %service.name, method = %method, "Request translated");

        let uri = backend_uri(backend, &format!("/{}/{}", service.name, method), None)?;
        let mut outbound = Request::new(body);
        *outbound.method_mut() = Method::POST;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        tracing::debug!(
            state = "CALL_SENT",
            backend = %backend.address,
            uri = %outbound.uri(),
            "Calling foreign HTTP backend"
        );

        let response = self
            .runtime
            .http
            .send(outbound, backend, config.max_call_recv_msg_size)
            .await?;

        tracing::debug!(
            state = "RESPONSE_RECEIVED",
            backend = %backend.address,
            status = response.status.as_u16(),
            "Foreign HTTP backend answered"
        );

        if !response.status.is_success() {
            return Err(GatewayError::BackendApplication {
                status: ApplicationStatus::Http(response.status),
                message: error_message(response.status, &response.body),
            });
        }

        let (document, metadata) = bridge::textual_to_structured(&response.body, &response.headers)
            .map_err(GatewayError::malformed_backend)?;
        let metadata = metadata
            .forwardable()
            .to_rpc()
            .map_err(GatewayError::malformed_backend)?;
        tracing::debug!(state = "BRIDGED_BACK", service = %service.name, method = %method, "Response translated");

        Ok(Response::from_parts(metadata, document.encode(), Extensions::default()))
    }
}

/// Backend body text, or the canonical reason when the body is empty.
fn error_message(status: axum::http::StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("backend error")
            .to_string()
    } else {
        text.to_string()
    }
}
