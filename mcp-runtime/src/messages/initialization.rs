//! Initialization and protocol negotiation message types.
//!
//! The MCP handshake is a three-step exchange:
//!
//! 1. Client sends `initialize` with its protocol version, capabilities, and
//!    client info
//! 2. Server responds with the negotiated version, its capabilities, server
//!    info, and optional instructions
//! 3. Client sends `notifications/initialized` to complete the handshake
//!
//! Both roles move to `Ready` only after step 3.

use super::{Capabilities, Implementation, ProtocolVersion};
use serde::{Deserialize, Serialize};

/// Client-to-server `initialize` request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Protocol version requested by the client
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    /// Capabilities offered by the client
    pub capabilities: Capabilities,

    /// Information about the client implementation
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

impl InitializeRequest {
    /// Create a new initialization request.
    pub fn new(
        protocol_version: ProtocolVersion,
        capabilities: Capabilities,
        client_info: Implementation,
    ) -> Self {
        Self {
            protocol_version,
            capabilities,
            client_info,
        }
    }
}

/// Server-to-client `initialize` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResponse {
    /// Protocol version selected by the server for this session
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    /// Capabilities offered by the server
    pub capabilities: Capabilities,

    /// Information about the server implementation
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,

    /// Optional usage instructions for the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
