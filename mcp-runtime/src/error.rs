//! Error types for MCP protocol operations.
//!
//! The error system covers every failure mode the engine can hit, layered the
//! same way the engine itself is:
//!
//! - **Transport errors**: connection, I/O, and stream failures
//! - **Protocol errors**: malformed JSON-RPC, handshake and state violations
//! - **Method errors**: JSON-RPC error responses returned by the peer
//! - **Cancellation**: pending work completed by a disconnect or an explicit
//!   cancel rather than a response
//!
//! Errors that must cross the wire are mapped onto JSON-RPC error codes via
//! [`McpError::error_object`]; the code constants live in [`codes`].

use serde_json::Value;
use thiserror::Error;

/// JSON-RPC 2.0 error codes used on the wire.
///
/// The first five are defined by the JSON-RPC specification; the `-32000`
/// range holds MCP-specific codes.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The underlying connection was closed.
    pub const CONNECTION_CLOSED: i32 = -32000;
    /// A transport-level failure occurred.
    pub const TRANSPORT_ERROR: i32 = -32001;
    /// The operation timed out.
    pub const TIMEOUT: i32 = -32002;
    /// The server requires the client to visit a URL before proceeding.
    pub const URL_ELICITATION_REQUIRED: i32 = -32042;
}

/// The main error type for all MCP operations.
#[derive(Error, Debug)]
pub enum McpError {
    /// Transport-related errors (connection, communication, etc.)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level errors (invalid messages, handshake failures, etc.)
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A JSON-RPC error response returned by the remote peer.
    #[error("Method error {code}: {message}")]
    Method {
        /// JSON-RPC error code
        code: i32,
        /// Error message from the peer
        message: String,
        /// Optional structured error data
        data: Option<Value>,
    },

    /// The operation was cancelled before a response arrived.
    ///
    /// Carries the cause: an explicit cancel, a disconnect, or a transport
    /// failure that completed the pending entry.
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Why the operation was cancelled
        reason: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        /// The underlying serde_json error
        source: serde_json::Error,
    },

    /// IO errors (stream operations, socket errors, etc.)
    #[error("IO error: {source}")]
    Io {
        #[from]
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Generic errors for cases not covered by specific variants
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

/// Transport-specific errors for the stdio, HTTP+SSE, and WebSocket transports.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum TransportError {
    /// Failed to establish the underlying connection
    #[error("Failed to connect {transport_type} transport: {reason}")]
    ConnectionFailed {
        transport_type: String,
        reason: String,
    },

    /// Connection was lost during operation
    #[error("Connection lost on {transport_type} transport: {reason}")]
    ConnectionLost {
        transport_type: String,
        reason: String,
    },

    /// Failed to send a message
    #[error("Failed to send via {transport_type}: {reason}")]
    SendFailed {
        transport_type: String,
        reason: String,
    },

    /// Transport is not in a state that permits the operation
    #[error("Transport not connected ({transport_type}): {reason}")]
    NotConnected {
        transport_type: String,
        reason: String,
    },

    /// Transport-specific configuration is invalid
    #[error("Invalid {transport_type} configuration: {reason}")]
    InvalidConfig {
        transport_type: String,
        reason: String,
    },

    /// Child-process errors for the spawning stdio transport
    #[error("Process error: {reason}")]
    Process { reason: String },

    /// HTTP-level errors for the HTTP+SSE transport
    #[error("HTTP error: {status} - {reason}")]
    Http { status: u16, reason: String },

    /// Server-Sent Events stream errors
    #[error("SSE error: {reason}")]
    Sse { reason: String },

    /// WebSocket frame or handshake errors
    #[error("WebSocket error: {reason}")]
    WebSocket { reason: String },

    /// The peer closed the connection
    #[error("Connection closed ({transport_type}): {reason}")]
    Closed {
        transport_type: String,
        reason: String,
    },
}

/// Protocol-level errors for JSON-RPC and MCP message handling.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum ProtocolError {
    /// The payload was not valid JSON
    #[error("Invalid JSON: {reason}")]
    InvalidJson { reason: String },

    /// The `jsonrpc` field was missing or not "2.0"
    #[error("Missing or invalid jsonrpc version: {found:?}")]
    InvalidVersion { found: Option<String> },

    /// The message matched none of the request/response/error/notification shapes
    #[error("Structurally indeterminate JSON-RPC message")]
    IndeterminateShape,

    /// An error object was missing its `code` or `message` field
    #[error("Invalid error object: {reason}")]
    InvalidErrorObject { reason: String },

    /// The requested method is not known to the dispatcher
    #[error("Unknown method: {method}")]
    MethodNotFound { method: String },

    /// Request parameters were missing or malformed
    #[error("Invalid params: {reason}")]
    InvalidParams { reason: String },

    /// The peer negotiated a protocol version other than the one requested
    #[error("Protocol version mismatch: requested {requested}, server selected {negotiated}")]
    VersionMismatch {
        requested: String,
        negotiated: String,
    },

    /// Operation attempted before the session reached Ready
    #[error("Not connected: {reason}")]
    NotInitialized { reason: String },

    /// The initialize exchange failed
    #[error("Initialization failed: {reason}")]
    InitializationFailed { reason: String },

    /// A response arrived that cannot be interpreted
    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// A session or transport state transition that the state machine forbids
    #[error("Invalid state transition: {from} -> {to}")]
    StateViolation { from: String, to: String },
}

/// Convenience type alias for Results using McpError.
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Create a new internal error with a custom message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a cancellation error with the given cause.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// The error issued for operations attempted outside the Ready state.
    pub fn not_connected() -> Self {
        Self::Protocol(ProtocolError::NotInitialized {
            reason: "not connected".to_string(),
        })
    }

    /// Map this error onto the JSON-RPC `(code, message, data)` triple used
    /// when it must be returned to the peer as an error response.
    pub fn error_object(&self) -> (i32, String, Option<Value>) {
        match self {
            McpError::Protocol(ProtocolError::InvalidJson { .. }) => {
                (codes::PARSE_ERROR, self.to_string(), None)
            }
            McpError::Protocol(ProtocolError::InvalidVersion { .. })
            | McpError::Protocol(ProtocolError::IndeterminateShape)
            | McpError::Protocol(ProtocolError::InvalidErrorObject { .. }) => {
                (codes::INVALID_REQUEST, self.to_string(), None)
            }
            McpError::Protocol(ProtocolError::MethodNotFound { .. }) => {
                (codes::METHOD_NOT_FOUND, "Unknown method".to_string(), None)
            }
            McpError::Protocol(ProtocolError::InvalidParams { reason }) => {
                (codes::INVALID_PARAMS, reason.clone(), None)
            }
            McpError::Transport(TransportError::Closed { .. }) => {
                (codes::CONNECTION_CLOSED, self.to_string(), None)
            }
            McpError::Transport(_) => (codes::TRANSPORT_ERROR, self.to_string(), None),
            McpError::Method {
                code,
                message,
                data,
            } => (*code, message.clone(), data.clone()),
            _ => (codes::INTERNAL_ERROR, self.to_string(), None),
        }
    }

    /// Get the error category for this error, for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Transport(_) => "transport",
            McpError::Protocol(_) => "protocol",
            McpError::Method { .. } => "method",
            McpError::Cancelled { .. } => "cancelled",
            McpError::Serialization { .. } => "serialization",
            McpError::Io { .. } => "io",
            McpError::Internal { .. } => "internal",
        }
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            McpError::Transport(TransportError::ConnectionFailed {
                transport_type: "http-sse".to_string(),
                reason: err.to_string(),
            })
        } else if let Some(status) = err.status() {
            McpError::Transport(TransportError::Http {
                status: status.as_u16(),
                reason: err.to_string(),
            })
        } else {
            McpError::Transport(TransportError::Http {
                status: 0,
                reason: err.to_string(),
            })
        }
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Transport(TransportError::InvalidConfig {
            transport_type: "http-sse".to_string(),
            reason: format!("Invalid URL: {err}"),
        })
    }
}
