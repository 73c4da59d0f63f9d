//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Path,
    http::Request,
    routing::post,
    Router,
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tonic::metadata::MetadataMap;
use tonic::server::UnaryService;
use tonic::transport::Channel;
use tonic::Status;

use dynamic_gateway::bridge::RpcStruct;
use dynamic_gateway::config::{BackendConfig, GatewayConfig, ProtocolKind, RouteConfig, ServiceConfig};
use dynamic_gateway::lifecycle::{self, RunningGateway};
use dynamic_gateway::rpc::RawCodec;

/// One request as seen by a mock HTTP backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Start a programmable HTTP/1.1 backend on an ephemeral port.
///
/// Every request is parsed off the raw socket, sent on the returned channel
/// and answered with the `(status, body)` the closure produces.
pub async fn start_http_backend<F, Fut>(f: F) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>)
where
    F: Fn(CapturedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let _ = tx.send(request.clone());
                        let (status, body) = f(request).await;

                        let response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nX-Backend: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason(status),
                            addr,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// Start a backend that always answers 200 with a fixed body.
pub async fn start_mock_backend(response: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    start_http_backend(move |_| async move { (200, response.to_string()) }).await
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        method,
        target,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// One call as seen by a mock gRPC backend.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub path: String,
    pub metadata: MetadataMap,
    pub payload: Bytes,
}

impl CapturedCall {
    pub fn document(&self) -> RpcStruct {
        RpcStruct::decode(&self.payload).unwrap()
    }
}

type GrpcHandler = Arc<dyn Fn(&CapturedCall) -> Result<Bytes, Status> + Send + Sync>;

#[derive(Clone)]
struct MockUnary {
    path: String,
    delay: Duration,
    handler: GrpcHandler,
    calls: mpsc::UnboundedSender<CapturedCall>,
}

impl UnaryService<Bytes> for MockUnary {
    type Response = Bytes;
    type Future = BoxFuture<'static, Result<tonic::Response<Bytes>, Status>>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let (metadata, _, payload) = request.into_parts();
            let call = CapturedCall {
                path: this.path,
                metadata,
                payload,
            };
            let _ = this.calls.send(call.clone());
            if !this.delay.is_zero() {
                tokio::time::sleep(this.delay).await;
            }

            let payload = (this.handler)(&call)?;
            let mut response = tonic::Response::new(payload);
            response
                .metadata_mut()
                .insert("x-backend", "mock-grpc".parse().unwrap());
            Ok(response)
        })
    }
}

/// Start a plaintext HTTP/2 gRPC backend answering every method with
/// `handler`, after `delay`.
pub async fn start_grpc_backend_delayed<F>(
    delay: Duration,
    handler: F,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedCall>)
where
    F: Fn(&CapturedCall) -> Result<Bytes, Status> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: GrpcHandler = Arc::new(handler);

    let app = Router::new().route(
        "/{service}/{method}",
        post(
            move |Path((service, method)): Path<(String, String)>, request: Request<Body>| {
                let svc = MockUnary {
                    path: format!("/{}/{}", service, method),
                    delay,
                    handler: handler.clone(),
                    calls: tx.clone(),
                };
                async move {
                    let mut grpc = tonic::server::Grpc::new(RawCodec);
                    grpc.unary(svc, request).await.map(Body::new)
                }
            },
        ),
    );

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, rx)
}

pub async fn start_grpc_backend<F>(handler: F) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedCall>)
where
    F: Fn(&CapturedCall) -> Result<Bytes, Status> + Send + Sync + 'static,
{
    start_grpc_backend_delayed(Duration::ZERO, handler).await
}

/// Encode a JSON object as a structured RPC message.
pub fn struct_bytes(value: serde_json::Value) -> Bytes {
    match value {
        serde_json::Value::Object(object) => RpcStruct::from_json_object(object).encode(),
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Decode a structured RPC message into JSON.
pub fn struct_json(bytes: &[u8]) -> serde_json::Value {
    RpcStruct::decode(bytes).unwrap().into_json()
}

/// Gateway config bound to loopback with ephemeral ports and both
/// listeners enabled.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.host = "127.0.0.1".into();
    config.http_port = 0;
    config.rpc_port = 0;
    config.run_http_server = true;
    config.run_rpc_server = true;
    config.connection_timeout = Duration::from_secs(2);
    config.default_call_timeout = Duration::from_secs(5);
    config
}

pub fn route(path: &str, target: ProtocolKind, backends: &[SocketAddr]) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        methods: Vec::new(),
        target_protocol: target,
        strip_path: false,
        backends: backends.iter().map(|a| BackendConfig::new(a.to_string())).collect(),
        timeout: None,
    }
}

pub fn service(name: &str, is_grpc: bool, backends: &[SocketAddr]) -> ServiceConfig {
    ServiceConfig {
        service_name: name.to_string(),
        is_grpc,
        max_call_recv_msg_size: 0,
        max_call_send_msg_size: 0,
        backends: backends.iter().map(|a| BackendConfig::new(a.to_string())).collect(),
        timeout: None,
        retry_attempts: 0,
    }
}

pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    lifecycle::start(config).await.unwrap()
}

pub fn http_url(gateway: &RunningGateway, path: &str) -> String {
    format!("http://{}{}", gateway.http_addr().unwrap(), path)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Plaintext channel to the gateway's RPC listener.
pub async fn rpc_channel(gateway: &RunningGateway) -> Channel {
    Channel::from_shared(format!("http://{}", gateway.rpc_addr().unwrap()))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

/// Unary call with an opaque payload.
pub async fn call_raw(
    channel: Channel,
    path: &'static str,
    request: tonic::Request<Bytes>,
) -> Result<tonic::Response<Bytes>, Status> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready().await.unwrap();
    grpc.unary(request, axum::http::uri::PathAndQuery::from_static(path), RawCodec)
        .await
}

/// A local address nothing listens on.
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
