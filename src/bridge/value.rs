//! Schema-less structured values.
//!
//! `RpcValue` is the gateway's own tagged union for dynamically typed RPC
//! payloads. It converts losslessly to and from `serde_json::Value` for the
//! primitive kinds JSON has, and to and from `google.protobuf.Struct` for the
//! wire.
//!
//! Numbers are carried as `f64`, as in `google.protobuf.Value`. Integral
//! values within ±2^53 render back as JSON integers; larger integers lose
//! precision the same way they do on the protobuf wire.

use std::collections::BTreeMap;

use bytes::Bytes;
use prost::Message;
use prost_types::value::Kind;
use serde_json::{Map, Number, Value as JsonValue};

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// One dynamically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<RpcValue>),
    Struct(RpcStruct),
}

/// A mapping from field name to value; the top-level RPC document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpcStruct {
    pub fields: BTreeMap<String, RpcValue>,
}

impl RpcStruct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&RpcValue> {
        self.fields.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RpcValue) -> Option<RpcValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encode as a `google.protobuf.Struct` message.
    pub fn encode(&self) -> Bytes {
        Bytes::from(prost_types::Struct::from(self.clone()).encode_to_vec())
    }

    /// Decode a `google.protobuf.Struct` message.
    pub fn decode(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        prost_types::Struct::decode(bytes).map(Self::from)
    }

    /// Build from a JSON object.
    pub fn from_json_object(object: Map<String, JsonValue>) -> Self {
        Self {
            fields: object
                .into_iter()
                .map(|(k, v)| (k, RpcValue::from(v)))
                .collect(),
        }
    }

    pub fn into_json(self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .into_iter()
                .map(|(k, v)| (k, JsonValue::from(v)))
                .collect(),
        )
    }
}

impl From<JsonValue> for RpcValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => RpcValue::Null,
            JsonValue::Bool(b) => RpcValue::Bool(b),
            JsonValue::Number(n) => RpcValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => RpcValue::String(s),
            JsonValue::Array(items) => RpcValue::List(items.into_iter().map(Into::into).collect()),
            JsonValue::Object(object) => RpcValue::Struct(RpcStruct::from_json_object(object)),
        }
    }
}

impl From<RpcValue> for JsonValue {
    fn from(value: RpcValue) -> Self {
        match value {
            RpcValue::Null => JsonValue::Null,
            RpcValue::Bool(b) => JsonValue::Bool(b),
            RpcValue::Number(n) => number_to_json(n),
            RpcValue::String(s) => JsonValue::String(s),
            RpcValue::List(items) => JsonValue::Array(items.into_iter().map(Into::into).collect()),
            RpcValue::Struct(s) => s.into_json(),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number(Number::from(n as i64));
    }
    // NaN and infinities have no JSON form.
    Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
}

impl From<RpcStruct> for prost_types::Struct {
    fn from(s: RpcStruct) -> Self {
        prost_types::Struct {
            fields: s
                .fields
                .into_iter()
                .map(|(k, v)| (k, prost_types::Value::from(v)))
                .collect(),
        }
    }
}

impl From<prost_types::Struct> for RpcStruct {
    fn from(s: prost_types::Struct) -> Self {
        Self {
            fields: s
                .fields
                .into_iter()
                .map(|(k, v)| (k, RpcValue::from(v)))
                .collect(),
        }
    }
}

impl From<RpcValue> for prost_types::Value {
    fn from(value: RpcValue) -> Self {
        let kind = match value {
            RpcValue::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
            RpcValue::Bool(b) => Kind::BoolValue(b),
            RpcValue::Number(n) => Kind::NumberValue(n),
            RpcValue::String(s) => Kind::StringValue(s),
            RpcValue::List(items) => Kind::ListValue(prost_types::ListValue {
                values: items.into_iter().map(Into::into).collect(),
            }),
            RpcValue::Struct(s) => Kind::StructValue(s.into()),
        };
        prost_types::Value { kind: Some(kind) }
    }
}

impl From<prost_types::Value> for RpcValue {
    fn from(value: prost_types::Value) -> Self {
        match value.kind {
            None | Some(Kind::NullValue(_)) => RpcValue::Null,
            Some(Kind::BoolValue(b)) => RpcValue::Bool(b),
            Some(Kind::NumberValue(n)) => RpcValue::Number(n),
            Some(Kind::StringValue(s)) => RpcValue::String(s),
            Some(Kind::ListValue(list)) => {
                RpcValue::List(list.values.into_iter().map(Into::into).collect())
            }
            Some(Kind::StructValue(s)) => RpcValue::Struct(s.into()),
        }
    }
}
