//! Gateway error taxonomy.
//!
//! Every failure a dispatched call can end in is one of these variants. The
//! HTTP server turns them into responses through `IntoResponse`; the RPC
//! server turns them into a `tonic::Status`. Backend-reported failures keep
//! their original status and message.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tonic::{Code, Status};

/// Which side produced a payload that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    Caller,
    Backend,
}

impl std::fmt::Display for PayloadOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadOrigin::Caller => write!(f, "caller"),
            PayloadOrigin::Backend => write!(f, "backend"),
        }
    }
}

/// Status reported by a backend, in the backend's own protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Rpc(Code),
    Http(StatusCode),
}

impl ApplicationStatus {
    /// Status as seen by an HTTP caller.
    pub fn to_http(self) -> StatusCode {
        match self {
            ApplicationStatus::Http(status) => status,
            ApplicationStatus::Rpc(code) => code_to_http(code),
        }
    }

    /// Status as seen by an RPC caller.
    pub fn to_code(self) -> Code {
        match self {
            ApplicationStatus::Rpc(code) => code,
            ApplicationStatus::Http(status) => http_to_code(status),
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationStatus::Rpc(code) => write!(f, "rpc {:?}", code),
            ApplicationStatus::Http(status) => write!(f, "http {}", status.as_u16()),
        }
    }
}

/// Errors that terminate a dispatched call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {method} {path}")]
    RouteNotFound { path: String, method: String },

    #[error("service {name} not found")]
    ServiceNotFound { name: String },

    #[error("invalid path {path}, expected /{{prefix}}/{{service}}/{{method}}")]
    InvalidRpcPath { path: String },

    #[error("no backends available for {key}")]
    NoBackendAvailable { key: String },

    #[error("backend {address} is at its connection limit")]
    BackendSaturated { address: String },

    #[error("backend {address} unreachable: {reason}")]
    BackendUnreachable { address: String, reason: String },

    #[error("malformed {origin} payload: {reason}")]
    MalformedPayload { origin: PayloadOrigin, reason: String },

    #[error("deadline of {after:?} exceeded")]
    DeadlineExceeded { after: Duration },

    #[error("backend returned {status}: {message}")]
    BackendApplication {
        status: ApplicationStatus,
        message: String,
    },
}

/// Result type for dispatch operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn malformed_caller(reason: impl std::fmt::Display) -> Self {
        GatewayError::MalformedPayload {
            origin: PayloadOrigin::Caller,
            reason: reason.to_string(),
        }
    }

    pub fn malformed_backend(reason: impl std::fmt::Display) -> Self {
        GatewayError::MalformedPayload {
            origin: PayloadOrigin::Backend,
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::ServiceNotFound { .. } => "SERVICE_NOT_FOUND",
            GatewayError::InvalidRpcPath { .. } => "INVALID_RPC_PATH",
            GatewayError::NoBackendAvailable { .. } => "NO_BACKEND_AVAILABLE",
            GatewayError::BackendSaturated { .. } => "BACKEND_SATURATED",
            GatewayError::BackendUnreachable { .. } => "BACKEND_UNREACHABLE",
            GatewayError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            GatewayError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            GatewayError::BackendApplication { .. } => "BACKEND_APPLICATION_ERROR",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } | GatewayError::ServiceNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::InvalidRpcPath { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NoBackendAvailable { .. } | GatewayError::BackendSaturated { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::BackendUnreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::MalformedPayload { origin, .. } => match origin {
                PayloadOrigin::Caller => StatusCode::BAD_REQUEST,
                PayloadOrigin::Backend => StatusCode::INTERNAL_SERVER_ERROR,
            },
            GatewayError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BackendApplication { status, .. } => status.to_http(),
        }
    }

    pub fn rpc_code(&self) -> Code {
        match self {
            GatewayError::RouteNotFound { .. } | GatewayError::ServiceNotFound { .. } => {
                Code::NotFound
            }
            GatewayError::InvalidRpcPath { .. } => Code::InvalidArgument,
            GatewayError::NoBackendAvailable { .. } => Code::Unavailable,
            GatewayError::BackendSaturated { .. } => Code::ResourceExhausted,
            GatewayError::BackendUnreachable { .. } => Code::Unavailable,
            GatewayError::MalformedPayload { origin, .. } => match origin {
                PayloadOrigin::Caller => Code::InvalidArgument,
                PayloadOrigin::Backend => Code::Internal,
            },
            GatewayError::DeadlineExceeded { .. } => Code::DeadlineExceeded,
            GatewayError::BackendApplication { status, .. } => status.to_code(),
        }
    }
}

impl From<GatewayError> for Status {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::BackendApplication { status, message } => {
                Status::new(status.to_code(), message)
            }
            other => Status::new(other.rpc_code(), other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let message = match &self {
            GatewayError::BackendApplication { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.kind(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

fn code_to_http(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_to_code(status: StatusCode) -> Code {
    match status.as_u16() {
        200..=299 => Code::Ok,
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::NotFound,
        408 | 504 => Code::DeadlineExceeded,
        409 => Code::Aborted,
        429 => Code::ResourceExhausted,
        501 => Code::Unimplemented,
        502 | 503 => Code::Unavailable,
        400..=499 => Code::FailedPrecondition,
        500 => Code::Internal,
        _ => Code::Unknown,
    }
}
