//! Header and metadata mapping.
//!
//! # Responsibilities
//! - Hold call metadata as lowercase names with ordered values
//! - Convert between HTTP header maps and metadata without loss
//! - Filter hop-by-hop and transport-owned entries before forwarding
//!
//! # Design Decisions
//! - Header values that are not visible ASCII are skipped, not escaped
//! - Forwarding filters are separate from conversion so conversion stays
//!   a faithful inverse

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tonic::metadata::MetadataMap;

use crate::bridge::BridgeError;

/// Connection-scoped headers that never cross the gateway.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Entries set by the transport on each leg; re-sent values would be stale.
const TRANSPORT_OWNED: &[&str] = &[
    "host",
    "content-length",
    "content-type",
    "user-agent",
    "grpc-encoding",
    "grpc-accept-encoding",
    "grpc-status",
    "grpc-message",
    "grpc-status-details-bin",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Whether a header or metadata entry should be forwarded across a
/// translated call.
pub fn is_forwardable(name: &str) -> bool {
    !is_hop_by_hop(name) && !TRANSPORT_OWNED.contains(&name)
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all("connection")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied().map(str::to_string).chain(named) {
        headers.remove(name.as_str());
    }
}

/// Call metadata: lowercase names mapped to one or more ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per header name, values in header order.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut metadata = Self::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                metadata.append(name.as_str(), value);
            }
        }
        metadata
    }

    pub fn from_rpc(map: &MetadataMap) -> Self {
        Self::from_headers(&map.clone().into_headers())
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries that must not be forwarded.
    pub fn forwardable(mut self) -> Self {
        self.entries.retain(|name, _| is_forwardable(name));
        self
    }

    /// Header map with every value of every entry.
    pub fn to_headers(&self) -> Result<HeaderMap, BridgeError> {
        let mut headers = HeaderMap::new();
        for (name, values) in &self.entries {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| BridgeError::InvalidHeader(name.clone()))?;
            for value in values {
                let value = HeaderValue::from_str(value)
                    .map_err(|_| BridgeError::InvalidHeader(name.clone()))?;
                headers.append(header.clone(), value);
            }
        }
        Ok(headers)
    }

    pub fn to_rpc(&self) -> Result<MetadataMap, BridgeError> {
        Ok(MetadataMap::from_headers(self.to_headers()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_round_trip_with_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));

        let metadata = Metadata::from_headers(&headers);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("X-Tag").unwrap(), ["a", "b"]);

        let back = metadata.to_headers().unwrap();
        let tags: Vec<_> = back.get_all("x-tag").iter().collect();
        assert_eq!(tags, ["a", "b"]);
        assert_eq!(back["authorization"], "Bearer t");
    }

    #[test]
    fn non_text_values_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-raw", HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap());
        headers.insert("x-ok", HeaderValue::from_static("1"));
        let metadata = Metadata::from_headers(&headers);
        assert!(metadata.get("x-raw").is_none());
        assert_eq!(metadata.get("x-ok").unwrap(), ["1"]);
    }

    #[test]
    fn forwardable_drops_transport_entries() {
        let mut metadata = Metadata::new();
        metadata.append("connection", "keep-alive");
        metadata.append("content-type", "application/grpc");
        metadata.append("grpc-status", "0");
        metadata.append("x-user", "alice");

        let kept = metadata.forwardable();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("x-user").unwrap(), ["alice"]);
    }

    #[test]
    fn strip_removes_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close, x-secret"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-keep", HeaderValue::from_static("1"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-keep"));
    }

    #[test]
    fn rpc_metadata_carries_entries() {
        let mut metadata = Metadata::new();
        metadata.append("x-trace", "abc");
        let map = metadata.to_rpc().unwrap();
        assert_eq!(map.get("x-trace").unwrap(), "abc");
        assert_eq!(Metadata::from_rpc(&map), metadata);
    }
}
