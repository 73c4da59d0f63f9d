//! Protocol bridge between textual HTTP/JSON and structured RPC values.
//!
//! # Data Flow
//! ```text
//! HTTP caller → RPC backend:
//!     JSON body + headers → textual_to_structured → (RpcStruct, Metadata)
//!     → Struct bytes on the wire
//!
//! RPC backend → HTTP caller:
//!     Struct bytes → RpcStruct + response metadata
//!     → structured_to_textual → (JSON body, headers)
//! ```
//!
//! # Design Decisions
//! - The top-level document is always a field map; an empty body is an
//!   empty document
//! - Translated output always carries `Content-Type: application/json`
//! - Both directions are pure: no I/O, no shared state

pub mod metadata;
pub mod value;

use axum::http::{header, HeaderMap, HeaderValue};
use bytes::Bytes;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use metadata::Metadata;
pub use value::{RpcStruct, RpcValue};

/// Content type of every translated textual body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Reasons a payload cannot cross the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object at the top level, found {0}")]
    NotAnObject(&'static str),

    #[error("invalid structured payload: {0}")]
    InvalidStruct(#[from] prost::DecodeError),

    #[error("metadata entry {0} is not a valid header")]
    InvalidHeader(String),
}

/// Parse a textual body and its headers into a structured document and
/// call metadata.
pub fn textual_to_structured(
    body: &[u8],
    headers: &HeaderMap,
) -> Result<(RpcStruct, Metadata), BridgeError> {
    let document = parse_document(body)?;
    Ok((document, Metadata::from_headers(headers)))
}

/// Render a structured document as JSON text, with metadata as headers.
pub fn structured_to_textual(
    document: &RpcStruct,
    metadata: &Metadata,
) -> Result<(Bytes, HeaderMap), BridgeError> {
    let body = serde_json::to_vec(&document.clone().into_json())?;
    let mut headers = metadata.to_headers()?;
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    Ok((Bytes::from(body), headers))
}

fn parse_document(body: &[u8]) -> Result<RpcStruct, BridgeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RpcStruct::new());
    }

    match serde_json::from_slice::<JsonValue>(body)? {
        JsonValue::Object(object) => Ok(RpcStruct::from_json_object(object)),
        other => Err(BridgeError::NotAnObject(json_kind(&other))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
