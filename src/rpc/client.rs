//! Outbound unary calls over a managed channel.

use axum::http::uri::PathAndQuery;
use bytes::Bytes;
use std::error::Error as _;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

use crate::net::manager::describe;
use crate::rpc::codec::RawCodec;

/// Per-call message size limits, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    pub max_recv: usize,
    pub max_send: usize,
}

/// How an outbound call failed.
#[derive(Debug)]
pub enum CallError {
    /// The channel could not carry the call; the connection is suspect.
    Transport(String),
    /// The backend answered with a non-OK status.
    Status(Status),
}

/// Invoke `/{service}/{method}` with an opaque request message.
pub async fn unary(
    channel: Channel,
    service: &str,
    method: &str,
    request: Request<Bytes>,
    limits: MessageLimits,
) -> Result<Response<Bytes>, CallError> {
    let path = PathAndQuery::try_from(format!("/{}/{}", service, method)).map_err(|e| {
        CallError::Status(Status::invalid_argument(format!(
            "invalid method path /{}/{}: {}",
            service, method, e
        )))
    })?;

    let mut grpc = tonic::client::Grpc::new(channel)
        .max_decoding_message_size(limits.max_recv)
        .max_encoding_message_size(limits.max_send);

    grpc.ready()
        .await
        .map_err(|e| CallError::Transport(describe(&e)))?;

    grpc.unary(request, path, RawCodec)
        .await
        .map_err(classify)
}

/// Statuses synthesized from an I/O failure carry their cause as a source;
/// statuses sent by a backend never do.
fn classify(status: Status) -> CallError {
    if status.source().is_some() {
        CallError::Transport(describe(&status))
    } else {
        CallError::Status(status)
    }
}
