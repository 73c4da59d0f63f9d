//! gRPC listener.
//!
//! # Responsibilities
//! - Accept unary calls on `/{service}/{method}` over HTTP/2
//! - Frame and unframe messages with the pass-through codec
//! - Hand each call to the dispatcher and report failures as statuses
//!
//! # Design Decisions
//! - Served by axum so both listeners share one server stack
//! - Message limits are resolved per service before decoding

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::Request,
    response::Response,
    routing::post,
    Router,
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tonic::server::UnaryService;
use tonic::Status;
use tower_http::trace::TraceLayer;

use crate::dispatch::Dispatcher;
use crate::rpc::codec::RawCodec;

/// Server for inbound RPC traffic.
pub struct RpcServer {
    router: Router,
}

impl RpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let router = Router::new()
            .route("/{service}/{method}", post(rpc_handler))
            .with_state(dispatcher)
            .layer(TraceLayer::new_for_grpc());
        Self { router }
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "RPC server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

async fn rpc_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path((service, method)): Path<(String, String)>,
    request: Request<Body>,
) -> Response {
    let limits = dispatcher.rpc_limits(&service);
    let mut grpc = tonic::server::Grpc::new(RawCodec)
        .max_decoding_message_size(limits.max_recv)
        .max_encoding_message_size(limits.max_send);

    let call = UnaryCall {
        dispatcher,
        service,
        method,
    };
    grpc.unary(call, request).await.map(Body::new)
}

/// One inbound unary call, bound to its service and method.
#[derive(Clone)]
struct UnaryCall {
    dispatcher: Arc<Dispatcher>,
    service: String,
    method: String,
}

impl UnaryService<Bytes> for UnaryCall {
    type Response = Bytes;
    type Future = BoxFuture<'static, Result<tonic::Response<Bytes>, Status>>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let service = self.service.clone();
        let method = self.method.clone();

        Box::pin(async move {
            dispatcher
                .dispatch_rpc(&service, &method, request)
                .await
                .map_err(|err| {
                    tracing::warn!(
                        service = %service,
                        method = %method,
                        error = %err,
                        "RPC call failed"
                    );
                    Status::from(err)
                })
        })
    }
}
