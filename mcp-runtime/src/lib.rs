//! # MCP Runtime
//!
//! `mcp-runtime` is a bidirectional Model Context Protocol (MCP) engine: a
//! JSON-RPC 2.0 core that lets a process act as an MCP **client** or
//! **server** over a pluggable transport.
//!
//! ## Features
//!
//! - **Complete message model**: the four JSON-RPC 2.0 wire shapes with an
//!   explicit, order-defined decoder
//! - **Session core**: state machine, pending-request correlation, and
//!   per-session request-id generation shared by both roles
//! - **Three transports**: stdio (spawning and attached), HTTP+SSE with
//!   resumable reconnect, and WebSocket with keepalive and reconnect (client
//!   and single-client server modes)
//! - **Server dispatch**: registries for tools, resources (exact URIs and
//!   URI templates), prompts, and completion, with capabilities derived from
//!   what is registered
//! - **Async tasks**: long-running tools return task descriptors and report
//!   progress through `tasks/*` and `notifications/tasks/status`
//! - **Role reversal**: servers issue `sampling/createMessage` and
//!   `roots/list` back to the client over the same session
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_runtime::client::{ClientConfig, McpClient};
//! use mcp_runtime::transport::{TransportConfig, TransportFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport =
//!         TransportFactory::create(TransportConfig::stdio("python", &["server.py"]))?;
//!     let mut client = McpClient::new(transport, ClientConfig::new("my-client", "0.1.0"));
//!
//!     let server = client.connect().await?;
//!     println!("connected to {}", server.server_info.name);
//!
//!     let tools = client.list_tools().await?;
//!     println!("{} tools available", tools.tools.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`messages`]: wire vocabulary and the codec
//! - [`error`]: the error taxonomy and JSON-RPC code mapping
//! - [`transport`]: the transport contract and the three implementations
//! - [`session`]: the substrate shared by both roles
//! - [`client`] / [`server`]: the two role implementations
//!
//! The engine imposes no timeouts of its own; wrap calls in your own
//! deadlines and use cancellation tokens where early abandonment matters.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod messages;
pub mod server;
pub mod session;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::{ClientConfig, ClientEvent, McpClient, NegotiatedServer};
pub use error::{McpError, McpResult};
pub use messages::{
    Capabilities, Implementation, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ProtocolVersion, RequestId,
};
pub use server::{McpServer, ServerConfig, ServerEvent, TaskHandle};
pub use session::{Session, SessionState};
pub use transport::{Transport, TransportConfig, TransportEvent, TransportFactory, TransportState};

/// Current version of the mcp-runtime library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current MCP protocol version spoken by this library.
pub const PROTOCOL_VERSION: &str = "2025-11-25";
