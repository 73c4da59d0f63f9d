//! Outbound HTTP client for textual backends.
//!
//! # Responsibilities
//! - Build backend URLs from a backend definition and a request path
//! - Send buffered requests, plaintext through a pooled hyper client and
//!   TLS through reqwest
//! - Hand relayed responses back as a stream
//! - Buffer responses for translation up to the configured message size
//!
//! # Design Decisions
//! - Both transports pool connections per host internally
//! - Certificate verification can be disabled per backend; a second
//!   reqwest client is kept for those backends

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Uri};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::BackendConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::net::manager::describe;

/// A backend response read fully into memory.
#[derive(Debug)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Bytes,
}

/// Client for HTTP backends.
#[derive(Clone)]
pub struct BackendHttpClient {
    plain: Client<HttpConnector, Full<Bytes>>,
    verified: reqwest::Client,
    insecure: reqwest::Client,
}

impl BackendHttpClient {
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let plain = Client::builder(TokioExecutor::new()).build(connector);
        let verified = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let insecure = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            plain,
            verified,
            insecure,
        })
    }

    /// Send `request` to `backend` and return the response with its body
    /// still streaming from the backend.
    pub async fn stream(
        &self,
        request: Request<Bytes>,
        backend: &BackendConfig,
    ) -> GatewayResult<Response<Body>> {
        let address = backend.address.as_str();

        if request.uri().scheme_str() != Some("https") {
            let response = self
                .plain
                .request(request.map(Full::new))
                .await
                .map_err(|e| unreachable(address, describe(&e)))?;
            return Ok(response.map(Body::new));
        }

        let client = if backend.tls_skip_verify {
            &self.insecure
        } else {
            &self.verified
        };
        let request = reqwest::Request::try_from(request)
            .map_err(|e| unreachable(address, describe(&e)))?;
        let response = client
            .execute(request)
            .await
            .map_err(|e| unreachable(address, describe(&e)))?;
        Ok(Response::from(response).map(Body::new))
    }

    /// Send `request` to `backend` and buffer at most `max_body` bytes of
    /// the response.
    pub async fn send(
        &self,
        request: Request<Bytes>,
        backend: &BackendConfig,
        max_body: usize,
    ) -> GatewayResult<BufferedResponse> {
        let response = self.stream(request, backend).await?;
        buffer(response, &backend.address, max_body).await
    }
}

/// Base URL of an HTTP backend: the address as given when it has a scheme,
/// otherwise `http://` or `https://` depending on the backend's TLS flag.
pub fn base_url(backend: &BackendConfig) -> String {
    let address = backend.address.trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else if backend.tls {
        format!("https://{}", address)
    } else {
        format!("http://{}", address)
    }
}

/// Full backend URI for `path` and an optional query string.
pub fn backend_uri(backend: &BackendConfig, path: &str, query: Option<&str>) -> GatewayResult<Uri> {
    let mut target = base_url(backend);
    if !path.starts_with('/') {
        target.push('/');
    }
    target.push_str(path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }

    target.parse().map_err(|e| {
        unreachable(
            &backend.address,
            format!("invalid backend URL {}: {}", target, e),
        )
    })
}

fn unreachable(address: &str, reason: String) -> GatewayError {
    GatewayError::BackendUnreachable {
        address: address.to_string(),
        reason,
    }
}

async fn buffer(response: Response<Body>, address: &str, max_body: usize) -> GatewayResult<BufferedResponse> {
    let (parts, body) = response.into_parts();
    let body = Limited::new(body, max_body)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                GatewayError::malformed_backend(format!(
                    "response body exceeds {} bytes",
                    max_body
                ))
            } else {
                unreachable(address, describe(&*e))
            }
        })?
        .to_bytes();

    Ok(BufferedResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_from_address() {
        assert_eq!(base_url(&BackendConfig::new("10.0.0.1:8000")), "http://10.0.0.1:8000");

        let mut tls = BackendConfig::new("api.internal:443");
        tls.tls = true;
        assert_eq!(base_url(&tls), "https://api.internal:443");

        assert_eq!(
            base_url(&BackendConfig::new("http://10.0.0.1:8000/v1/")),
            "http://10.0.0.1:8000/v1"
        );
    }

    #[test]
    fn backend_uri_keeps_path_and_query() {
        let backend = BackendConfig::new("127.0.0.1:3000");
        let uri = backend_uri(&backend, "/api/users", Some("page=2")).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:3000/api/users?page=2");

        let prefixed = BackendConfig::new("http://127.0.0.1:3000/v1");
        let uri = backend_uri(&prefixed, "/billing/Charge", None).unwrap();
        assert_eq!(uri.path(), "/v1/billing/Charge");
    }

    #[test]
    fn bad_address_is_unreachable() {
        let backend = BackendConfig::new("not a host");
        assert!(matches!(
            backend_uri(&backend, "/", None),
            Err(GatewayError::BackendUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn buffering_stops_at_limit() {
        let response = Response::new(Body::from(vec![b'x'; 64]));
        let err = buffer(response, "127.0.0.1:1", 16).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedPayload { .. }));

        let response = Response::new(Body::from(vec![b'x'; 16]));
        let buffered = buffer(response, "127.0.0.1:1", 16).await.unwrap();
        assert_eq!(buffered.body.len(), 16);
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = BackendHttpClient::new(Duration::from_secs(1)).unwrap();
        let backend = BackendConfig::new(addr.to_string());
        let request = Request::builder()
            .uri(backend_uri(&backend, "/", None).unwrap())
            .body(Bytes::new())
            .unwrap();

        let err = client.send(request, &backend, 1024).await.unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnreachable { .. }));
    }
}
