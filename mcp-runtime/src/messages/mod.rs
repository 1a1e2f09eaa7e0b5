//! MCP message types and JSON-RPC structures.
//!
//! This module holds the complete wire vocabulary of the engine:
//!
//! - **Core**: the four JSON-RPC message shapes and the codec
//! - **Initialization**: version negotiation and capability exchange
//! - **Tools**: discovery and invocation
//! - **Resources**: listing, reading, templates, and subscriptions
//! - **Prompts**: templates and retrieval
//! - **Sampling**: server-initiated LLM requests and completion
//! - **Logging**: log, progress, and cancellation notifications
//! - **Tasks**: long-running tool invocations
//! - **Roots**: client-declared workspace anchors
//!
//! Method-level payloads (`params`, `result`) are typed here; the engine
//! serializes them into the opaque subtrees the codec carries.

pub mod core;
pub mod initialization;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tasks;
pub mod tools;

pub use self::core::{
    JsonRpcError, JsonRpcErrorResponse, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, JSONRPC_VERSION,
};
pub use initialization::{InitializeRequest, InitializeResponse};
pub use logging::{CancelledParams, LogLevel, LoggingMessageParams, ProgressParams};
pub use prompts::{
    GetPromptRequest, GetPromptResponse, ListPromptsResponse, Prompt, PromptArgument,
    PromptContent, PromptMessage, PromptRole,
};
pub use resources::{
    ListResourceTemplatesResponse, ListResourcesResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceContent, ResourceTemplate, ResourceUpdatedParams,
    SubscribeRequest, UnsubscribeRequest,
};
pub use roots::{ListRootsResponse, Root};
pub use sampling::{
    CompleteRequest, CompleteResponse, CompletionArgument, CompletionRef, CompletionResult,
    CreateMessageRequest, CreateMessageResponse, ModelHint, ModelPreferences, SamplingContent,
    SamplingMessage, SamplingRole,
};
pub use tasks::{ListTasksResponse, Task, TaskIdParams, TaskStatus, TaskStatusParams};
pub use tools::{
    CallToolRequest, CallToolResponse, ListToolsResponse, Tool, ToolContent,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MCP protocol version identifier.
///
/// Versions are date-based strings; unknown versions are preserved verbatim
/// so negotiation can compare them without loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// MCP protocol version 2024-11-05 (legacy)
    #[serde(rename = "2024-11-05")]
    V2024_11_05,

    /// MCP protocol version 2025-03-26
    #[serde(rename = "2025-03-26")]
    V2025_03_26,

    /// MCP protocol version 2025-11-25 (current)
    #[serde(rename = "2025-11-25")]
    V2025_11_25,

    /// Any other version string, preserved for comparison
    #[serde(untagged)]
    Custom(String),
}

impl ProtocolVersion {
    /// Get the string representation of the protocol version.
    pub fn as_str(&self) -> &str {
        match self {
            Self::V2024_11_05 => "2024-11-05",
            Self::V2025_03_26 => "2025-03-26",
            Self::V2025_11_25 => "2025-11-25",
            Self::Custom(version) => version,
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V2025_11_25
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability set exchanged during initialization.
///
/// Standard capabilities are flattened alongside any custom or experimental
/// entries the peer declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Capabilities {
    /// Standard MCP capabilities
    #[serde(flatten)]
    pub standard: StandardCapabilities,

    /// Custom or experimental capabilities
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

/// Standard MCP capabilities as defined by the specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StandardCapabilities {
    /// Server capability: offers tools for invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,

    /// Server capability: offers resources for reading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapabilities>,

    /// Server capability: offers prompt templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptCapabilities>,

    /// Server capability: some tools run as asynchronous tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskCapabilities>,

    /// Server capability: offers argument completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionCapabilities>,

    /// Client capability: accepts sampling requests from the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapabilities>,

    /// Client capability: exposes workspace roots to the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapabilities>,
}

/// Tool-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolCapabilities {
    /// Whether the server emits tool list-changed notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceCapabilities {
    /// Whether the server supports resource subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    /// Whether the server emits resource list-changed notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompt-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PromptCapabilities {
    /// Whether the server emits prompt list-changed notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Task-related capabilities (experimental).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskCapabilities {}

/// Completion-related capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompletionCapabilities {}

/// Sampling-related capabilities (client side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SamplingCapabilities {}

/// Roots-related capabilities (client side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RootsCapabilities {
    /// Whether the client emits roots list-changed notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Implementation information for a client or server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Name of the implementation
    pub name: String,

    /// Version of the implementation
    pub version: String,

    /// Additional implementation metadata
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Implementation {
    /// Create a new implementation info structure.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            metadata: HashMap::new(),
        }
    }
}
