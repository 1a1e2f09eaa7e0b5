//! Shared helpers for the integration tests.

use std::sync::Once;

use mcp_runtime::client::{ClientConfig, McpClient};
use mcp_runtime::server::{McpServer, ServerConfig};
use mcp_runtime::transport::stdio::StdioTransport;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging once per process; `RUST_LOG` controls the filter.
pub fn setup_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Build a client and a server wired to each other through an in-memory
/// duplex pipe, each over an attached stdio transport. Neither side is
/// started or connected yet.
pub fn linked_pair(client_config: ClientConfig, server_config: ServerConfig) -> (McpClient, McpServer) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);

    let (client_read, client_write) = tokio::io::split(client_end);
    let client_transport = StdioTransport::attached(client_read, client_write);
    let client = McpClient::new(Box::new(client_transport), client_config);

    let (server_read, server_write) = tokio::io::split(server_end);
    let server_transport = StdioTransport::attached(server_read, server_write);
    let server = McpServer::new(Box::new(server_transport), server_config);

    (client, server)
}

/// [`linked_pair`] with default identities.
pub fn default_pair() -> (McpClient, McpServer) {
    linked_pair(ClientConfig::new("c", "0"), ServerConfig::new("s", "0"))
}
