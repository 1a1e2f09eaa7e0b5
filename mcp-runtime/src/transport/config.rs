//! Transport configuration types.
//!
//! Each transport gets a dedicated, serializable configuration struct; the
//! [`TransportConfig`] enum ties them together for the factory. The engine
//! imposes no request timeouts, so none appear here; durations configure
//! transport-internal behavior only (reconnect pacing, keepalive).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{McpResult, TransportError};

/// Default SSE reconnect delay, overridable by the server's `retry:` field.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Default WebSocket keepalive interval.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Transport configuration for the outbound (client-side) transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Child-process communication over stdio
    Stdio(StdioConfig),

    /// HTTP POST out, Server-Sent Events in
    HttpSse(HttpSseConfig),

    /// WebSocket client connection
    WebSocket(WebSocketConfig),
}

impl TransportConfig {
    /// Create a stdio configuration that spawns `command` with `args`.
    pub fn stdio(command: impl Into<String>, args: &[impl ToString]) -> Self {
        Self::Stdio(StdioConfig {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
            environment: HashMap::new(),
        })
    }

    /// Create an HTTP+SSE configuration for the given base URL.
    pub fn http_sse(base_url: impl AsRef<str>) -> McpResult<Self> {
        let url: Url = base_url
            .as_ref()
            .parse()
            .map_err(|e| TransportError::InvalidConfig {
                transport_type: "http-sse".to_string(),
                reason: format!("Invalid base URL: {e}"),
            })?;

        Ok(Self::HttpSse(HttpSseConfig::new(url)))
    }

    /// Create a WebSocket client configuration for the given ws/wss URL.
    pub fn websocket(url: impl AsRef<str>) -> McpResult<Self> {
        let url: Url = url
            .as_ref()
            .parse()
            .map_err(|e| TransportError::InvalidConfig {
                transport_type: "websocket".to_string(),
                reason: format!("Invalid URL: {e}"),
            })?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(TransportError::InvalidConfig {
                transport_type: "websocket".to_string(),
                reason: format!("URL scheme must be ws or wss, got {}", url.scheme()),
            }
            .into());
        }

        Ok(Self::WebSocket(WebSocketConfig::new(url)))
    }

    /// Short name of the configured transport kind.
    pub fn transport_type(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::HttpSse(_) => "http-sse",
            Self::WebSocket(_) => "websocket",
        }
    }
}

/// Configuration for the spawning stdio transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Command to spawn
    pub command: String,

    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the child process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Environment variables set for the child process
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// Configuration for the HTTP+SSE transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSseConfig {
    /// Base URL both endpoints are resolved against
    pub base_url: Url,

    /// Path POSTed to for outbound messages
    #[serde(default = "default_post_endpoint")]
    pub post_endpoint: String,

    /// Path of the SSE stream
    #[serde(default = "default_sse_endpoint")]
    pub sse_endpoint: String,

    /// Bearer token sent as `Authorization` on every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Additional headers applied to every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Whether the SSE stream reconnects after loss
    #[serde(default = "default_true")]
    pub reconnect_enabled: bool,

    /// Delay before a reconnect attempt; `retry:` fields update it
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,
}

impl HttpSseConfig {
    /// Create a configuration with default endpoints and reconnect policy.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            post_endpoint: default_post_endpoint(),
            sse_endpoint: default_sse_endpoint(),
            auth_token: None,
            headers: HashMap::new(),
            reconnect_enabled: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Set the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub(crate) fn post_url(&self) -> McpResult<Url> {
        self.base_url
            .join(&self.post_endpoint)
            .map_err(|e| invalid_endpoint("http-sse", &self.post_endpoint, e))
    }

    pub(crate) fn sse_url(&self) -> McpResult<Url> {
        self.base_url
            .join(&self.sse_endpoint)
            .map_err(|e| invalid_endpoint("http-sse", &self.sse_endpoint, e))
    }
}

/// Configuration for the WebSocket client transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// ws:// or wss:// URL to connect to
    pub url: Url,

    /// Subprotocols offered during the upgrade
    #[serde(default)]
    pub subprotocols: Vec<String>,

    /// Bearer token sent as `Authorization` on the upgrade request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Interval between empty-text keepalive frames; `None` disables them
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: Option<Duration>,

    /// Whether the connection reconnects after loss
    #[serde(default = "default_true")]
    pub reconnect_enabled: bool,

    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,

    /// Bound on consecutive reconnect attempts; `None` retries forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
}

impl WebSocketConfig {
    /// Create a configuration with default keepalive and reconnect policy.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            subprotocols: Vec::new(),
            auth_token: None,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            reconnect_enabled: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: None,
        }
    }
}

/// Configuration for the single-client WebSocket server transport.
///
/// TLS termination is not handled here; put the server behind a
/// TLS-terminating proxy when wss:// is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upgrade path accepted; requests for other paths get 404
    #[serde(default = "default_path")]
    pub path: String,

    /// Subprotocols the server accepts; the first client offer wins
    #[serde(default)]
    pub subprotocols: Vec<String>,

    /// Exact `Origin` header required; mismatches get 403
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_origin: Option<String>,

    /// Bearer token required in `Authorization`; failures get 401
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Interval between empty-text keepalive frames; `None` disables them
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: Option<Duration>,
}

impl WebSocketServerConfig {
    /// Create a configuration listening on the given port of localhost.
    pub fn new(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            path: default_path(),
            subprotocols: Vec::new(),
            required_origin: None,
            auth_token: None,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
        }
    }
}

fn invalid_endpoint(transport: &str, endpoint: &str, e: url::ParseError) -> crate::error::McpError {
    TransportError::InvalidConfig {
        transport_type: transport.to_string(),
        reason: format!("Invalid endpoint {endpoint}: {e}"),
    }
    .into()
}

fn default_post_endpoint() -> String {
    "/message".to_string()
}

fn default_sse_endpoint() -> String {
    "/sse".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

fn default_keepalive() -> Option<Duration> {
    Some(DEFAULT_KEEPALIVE_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdio_config_creation() {
        let config = TransportConfig::stdio("python", &["server.py"]);
        assert_eq!(config.transport_type(), "stdio");
        if let TransportConfig::Stdio(stdio) = config {
            assert_eq!(stdio.command, "python");
            assert_eq!(stdio.args, vec!["server.py"]);
        } else {
            panic!("expected stdio config");
        }
    }

    #[test]
    fn test_http_sse_endpoint_resolution() {
        let config = TransportConfig::http_sse("http://localhost:8080").unwrap();
        if let TransportConfig::HttpSse(http) = config {
            assert_eq!(http.post_url().unwrap().as_str(), "http://localhost:8080/message");
            assert_eq!(http.sse_url().unwrap().as_str(), "http://localhost:8080/sse");
        } else {
            panic!("expected http-sse config");
        }
    }

    #[test]
    fn test_websocket_rejects_http_scheme() {
        assert!(TransportConfig::websocket("http://localhost:9000").is_err());
        assert!(TransportConfig::websocket("ws://localhost:9000/mcp").is_ok());
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = TransportConfig::http_sse("https://api.example.com/mcp/").unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: TransportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_reconnect_defaults() {
        let config = WebSocketConfig::new("ws://localhost:9000".parse().unwrap());
        assert!(config.reconnect_enabled);
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.max_reconnect_attempts, None);
    }
}
