//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler and health endpoints
//! - Wire up middleware (request ID, tracing, CORS, panic recovery, body limit)
//! - Bind server to listener and stop on the shutdown signal
//! - Hand every other request to the dispatcher

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tracing::Instrument;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// How long browsers may cache a preflight answer.
const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server in front of `dispatcher`.
    pub fn new(config: &GatewayConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState { dispatcher };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/connections", get(connections_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(CatchPanicLayer::new())
                    .layer(RequestBodyLimitLayer::new(config.max_call_recv_msg_size))
                    .layer(cors_layer(config)),
            )
    }

    /// The router, for serving on a custom listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// CORS policy from configuration.
///
/// `allow_all_origin` answers every origin with `*`; otherwise only the
/// listed origins are echoed back. No origins configured means no CORS
/// headers at all.
fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let headers: Vec<HeaderName> = if config.allowed_headers.is_empty() {
        vec![header::CONTENT_TYPE, header::AUTHORIZATION]
    } else {
        config
            .allowed_headers
            .iter()
            .filter_map(|h| match HeaderName::try_from(h.trim()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %h, "Ignoring invalid CORS header name");
                    None
                }
            })
            .collect()
    };

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers)
        .max_age(CORS_MAX_AGE);

    if config.allow_all_origin {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Main proxy handler.
/// Hands the request to the dispatcher and renders failures as JSON.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        state = "RECEIVED",
        "Dispatching request"
    );

    let span = tracing::info_span!("dispatch", request_id = %request_id);
    match state.dispatcher.dispatch_http(request).instrument(span).await {
        Ok(response) => {
            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                state = "RESPONDED",
                "Request completed"
            );
            response
        }
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                error = %err,
                kind = err.kind(),
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                state = "FAILED",
                "Request failed"
            );
            err.into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn connections_handler(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.dispatcher.connection_health())
}
