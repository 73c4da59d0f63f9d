//! Calls arriving on the HTTP listener.

use std::borrow::Cow;

use axum::{
    body::{to_bytes, Body},
    http::{request::Parts, Request, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;

use super::{global_limits, Dispatcher};
use crate::bridge::metadata::strip_hop_by_hop;
use crate::bridge::{self, Metadata, RpcStruct};
use crate::config::{BackendConfig, GatewayConfig, ProtocolKind};
use crate::error::{GatewayError, GatewayResult};
use crate::http::client::backend_uri;
use crate::load_balancer::backend::BackendCallGuard;
use crate::net::ClientTlsOptions;
use crate::resilience::with_deadline;
use crate::routing::Route;

impl Dispatcher {
    /// Dispatch one HTTP request: relay it to an HTTP backend or translate
    /// it into a call on an RPC backend.
    pub async fn dispatch_http(&self, request: Request<Body>) -> GatewayResult<Response<Body>> {
        let registry = self.runtime.registry.load_full();
        let config = self.runtime.config.load_full();

        let path = request.uri().path().to_string();
        let method = request.method().as_str().to_string();
        let route = registry
            .match_route(&path, &method)
            .ok_or_else(|| GatewayError::RouteNotFound {
                path: path.clone(),
                method: method.clone(),
            })?;

        tracing::debug!(
            state = "ROUTE_RESOLVED",
            route = route.index,
            method = %method,
            path = %path,
            protocol = %route.target,
            "Route matched"
        );

        let deadline = route.timeout.unwrap_or(config.default_call_timeout);
        with_deadline(deadline, self.forward_http(route, &config, request)).await
    }

    async fn forward_http(
        &self,
        route: &Route,
        config: &GatewayConfig,
        request: Request<Body>,
    ) -> GatewayResult<Response<Body>> {
        let (backend, guard) = self.select_backend(&route.key(), |addr| route.backend(addr).cloned())?;

        let (parts, body) = request.into_parts();
        let body = to_bytes(body, config.max_call_recv_msg_size)
            .await
            .map_err(|e| GatewayError::malformed_caller(format!("request body: {}", e)))?;

        match route.target {
            ProtocolKind::Http => self.relay_http(route, &backend, guard, parts, body).await,
            ProtocolKind::Grpc => {
                let reply = self.http_to_rpc(&backend, config, parts, body).await;
                drop(guard);
                reply
            }
        }
    }

    /// Forward the request to an HTTP backend and stream its response back
    /// as is. The in-flight slot is held until the body has been sent on.
    async fn relay_http(
        &self,
        route: &Route,
        backend: &BackendConfig,
        guard: BackendCallGuard,
        parts: Parts,
        body: Bytes,
    ) -> GatewayResult<Response<Body>> {
        let path = if route.strip_path {
            route.pattern.strip(parts.uri.path())
        } else {
            Cow::Borrowed(parts.uri.path())
        };
        let uri = backend_uri(backend, &path, parts.uri.query())?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        tracing::debug!(
            state = "CALL_SENT",
            backend = %backend.address,
            uri = %outbound.uri(),
            "Relaying to HTTP backend"
        );

        let response = self.runtime.http.stream(outbound, backend).await?;

        tracing::debug!(
            state = "RESPONSE_RECEIVED",
            backend = %backend.address,
            status = response.status().as_u16(),
            "HTTP backend answered"
        );

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        let body = body.map_frame(move |frame| {
            let _held = &guard;
            frame
        });
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    /// Translate `/{prefix}/{service}/{method}` with a JSON body into a
    /// unary call carrying a structured document.
    async fn http_to_rpc(
        &self,
        backend: &BackendConfig,
        config: &GatewayConfig,
        parts: Parts,
        body: Bytes,
    ) -> GatewayResult<Response<Body>> {
        let (service, method) = rpc_target(parts.uri.path())?;

        let (document, metadata) = bridge::textual_to_structured(&body, &parts.headers)
            .map_err(GatewayError::malformed_caller)?;
        let mut call = tonic::Request::new(document.encode());
        *call.metadata_mut() = metadata
            .forwardable()
            .to_rpc()
            .map_err(GatewayError::malformed_caller)?;
        tracing::debug!(state = "BRIDGED", service = %service, method = %method, "Request translated");

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

        let response = self
            .invoke(&connection, service, method, call, global_limits(config))
            .await?;

        let (response_metadata, payload, _) = response.into_parts();
        let document = RpcStruct::decode(&payload).map_err(GatewayError::malformed_backend)?;
        let (body, headers) = bridge::structured_to_textual(
            &document,
            &Metadata::from_rpc(&response_metadata).forwardable(),
        )
        .map_err(GatewayError::malformed_backend)?;
        tracing::debug!(state = "BRIDGED_BACK", service = %service, method = %method, "Response translated");

        let mut reply = Response::new(Body::from(body));
        *reply.headers_mut() = headers;
        Ok(reply)
    }
}

/// Service and method from `/{prefix}/{service}/{method}[/...]`.
fn rpc_target(path: &str) -> GatewayResult<(&str, &str)> {
    let mut segments = path.trim_matches('/').split('/').skip(1);
    match (segments.next(), segments.next()) {
        (Some(service), Some(method)) if !service.is_empty() && !method.is_empty() => {
            Ok((service, method))
        }
        _ => Err(GatewayError::InvalidRpcPath {
            path: path.to_string(),
        }),
    }
}
