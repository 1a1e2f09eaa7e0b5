//! Core JSON-RPC 2.0 message structures and the wire codec.
//!
//! Every MCP exchange is carried by one of four message shapes:
//!
//! - **Request**: carries a `method` and an `id`, expects exactly one reply
//! - **Response**: carries the `result` for a previous request `id`
//! - **Error**: carries an error object, with a null `id` for parse errors
//! - **Notification**: carries a `method` with no `id`, fire-and-forget
//!
//! Decoding does not rely on serde's untagged machinery: the wire shape is
//! discriminated explicitly, in a fixed order, so that malformed payloads
//! produce a precise [`ProtocolError`] instead of an opaque variant-mismatch.
//! The `params`, `result`, and `data` subtrees are never interpreted here;
//! they travel as opaque [`Value`]s.
//!
//! # Examples
//!
//! ```rust
//! use mcp_runtime::messages::{JsonRpcMessage, JsonRpcRequest, RequestId};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(
//!     RequestId::from("1"),
//!     "tools/call",
//!     Some(json!({"name": "echo", "arguments": {"text": "hi"}})),
//! );
//!
//! let wire = JsonRpcMessage::Request(request).encode().unwrap();
//! let parsed = JsonRpcMessage::decode(&wire).unwrap();
//! assert!(matches!(parsed, JsonRpcMessage::Request(_)));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// The JSON-RPC protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request ID supporting both string and numeric formats.
///
/// The engine generates string ids, but the codec accepts numeric ids from
/// peers and re-emits them as received. Correlation treats ids opaquely
/// through their [`Display`] form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String-based request identifier
    String(String),
    /// Numeric request identifier
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// JSON-RPC 2.0 request message.
///
/// Field declaration order is the canonical wire order:
/// `jsonrpc, id, method, params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Unique identifier for request/response correlation
    pub id: RequestId,

    /// Name of the method to invoke
    pub method: String,

    /// Parameters for the method, carried opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 success response.
///
/// `result` is always emitted, as explicit `null` when the upstream payload
/// is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Identifier of the request this responds to
    pub id: RequestId,

    /// Result value; `Value::Null` when the payload is absent
    pub result: Value,
}

impl JsonRpcResponse {
    /// Create a success response for the given request id.
    pub fn new(id: impl Into<RequestId>, result: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: result.unwrap_or(Value::Null),
        }
    }
}

/// The error object inside a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional structured error data, carried opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 error response.
///
/// Unlike other optional fields, `id` is always emitted: explicit `null`
/// marks an error that could not be correlated (e.g. a parse error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Identifier of the failed request, or None (wire null) when unknown
    pub id: Option<RequestId>,

    /// The error object
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    /// Create an error response.
    pub fn new(
        id: Option<RequestId>,
        code: i32,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcError {
                code,
                message: message.into(),
                data,
            },
        }
    }
}

/// JSON-RPC 2.0 notification message.
///
/// The absence of an `id` field is what distinguishes a notification from a
/// request; notifications never receive replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Name of the notification method
    pub method: String,

    /// Parameters for the notification, carried opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A decoded JSON-RPC message, one of the four wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Method invocation expecting a reply
    Request(JsonRpcRequest),
    /// Successful reply to a request
    Response(JsonRpcResponse),
    /// Error reply, possibly uncorrelated
    Error(JsonRpcErrorResponse),
    /// Fire-and-forget method invocation
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Serialize to the canonical single-line JSON form.
    ///
    /// Compact serde output contains no literal newlines, which is what the
    /// newline-delimited transports rely on.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            JsonRpcMessage::Request(m) => serde_json::to_string(m),
            JsonRpcMessage::Response(m) => serde_json::to_string(m),
            JsonRpcMessage::Error(m) => serde_json::to_string(m),
            JsonRpcMessage::Notification(m) => serde_json::to_string(m),
        }
    }

    /// Decode one JSON-RPC message from its wire form.
    ///
    /// Shape discrimination runs in a fixed order:
    ///
    /// 1. `method` and `id` present → Request
    /// 2. `method` present, `id` absent → Notification
    /// 3. `result` present and `id` present → Response
    /// 4. `error` present → Error (with or without id)
    /// 5. otherwise → [`ProtocolError::IndeterminateShape`]
    ///
    /// A missing or non-"2.0" `jsonrpc` field fails before discrimination.
    pub fn decode(json: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ProtocolError::InvalidJson {
            reason: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Decode from an already-parsed JSON tree.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let object = match value {
            Value::Object(map) => map,
            _ => return Err(ProtocolError::IndeterminateShape),
        };

        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            found => {
                return Err(ProtocolError::InvalidVersion {
                    found: found.map(str::to_string),
                })
            }
        }

        let id = parse_id(&object)?;
        let has_method = object.get("method").is_some();

        if has_method {
            let method = object
                .get("method")
                .and_then(Value::as_str)
                .ok_or(ProtocolError::IndeterminateShape)?
                .to_string();
            let params = non_null(object.get("params"));

            return Ok(match id {
                Some(id) => JsonRpcMessage::Request(JsonRpcRequest {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    method,
                    params,
                }),
                None => JsonRpcMessage::Notification(JsonRpcNotification {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    method,
                    params,
                }),
            });
        }

        if object.contains_key("result") {
            if let Some(id) = id {
                let result = object.get("result").cloned().unwrap_or(Value::Null);
                return Ok(JsonRpcMessage::Response(JsonRpcResponse {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    result,
                }));
            }
            // A result without an id is only meaningful if an error object
            // is also present, which the next arm handles.
        }

        if let Some(error_value) = object.get("error") {
            let error = parse_error_object(error_value)?;
            return Ok(JsonRpcMessage::Error(JsonRpcErrorResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                error,
            }));
        }

        Err(ProtocolError::IndeterminateShape)
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// The correlation id, where one exists.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Response(r) => Some(&r.id),
            JsonRpcMessage::Error(e) => e.id.as_ref(),
            JsonRpcMessage::Notification(_) => None,
        }
    }
}

impl Serialize for JsonRpcMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            JsonRpcMessage::Request(m) => m.serialize(serializer),
            JsonRpcMessage::Response(m) => m.serialize(serializer),
            JsonRpcMessage::Error(m) => m.serialize(serializer),
            JsonRpcMessage::Notification(m) => m.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        JsonRpcMessage::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn parse_id(object: &Map<String, Value>) -> Result<Option<RequestId>, ProtocolError> {
    match object.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or(ProtocolError::IndeterminateShape),
        Some(_) => Err(ProtocolError::IndeterminateShape),
    }
}

fn parse_error_object(value: &Value) -> Result<JsonRpcError, ProtocolError> {
    let object = value
        .as_object()
        .ok_or_else(|| ProtocolError::InvalidErrorObject {
            reason: "error is not an object".to_string(),
        })?;

    let code = object
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProtocolError::InvalidErrorObject {
            reason: "missing code".to_string(),
        })? as i32;

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidErrorObject {
            reason: "missing message".to_string(),
        })?
        .to_string();

    Ok(JsonRpcError {
        code,
        message,
        data: non_null(object.get("data")),
    })
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.clone()),
    }
}
