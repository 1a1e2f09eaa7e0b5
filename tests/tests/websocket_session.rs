//! A full MCP session over WebSocket: server role on the listening side,
//! client role dialing in, same handshake and dispatch as stdio.

use mcp_runtime::client::{ClientConfig, McpClient};
use mcp_runtime::messages::{Tool, ToolContent};
use mcp_runtime::server::{McpServer, ServerConfig};
use mcp_runtime::session::SessionState;
use mcp_runtime::transport::websocket::{WebSocketServerTransport, WebSocketTransport};
use mcp_runtime::transport::{WebSocketConfig, WebSocketServerConfig};
use mcp_runtime_tests::setup_test_logging;
use serde_json::json;

/// Reserve an ephemeral port for the server to listen on.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn websocket_session_end_to_end() {
    setup_test_logging();
    let port = free_port();

    let mut server_config = WebSocketServerConfig::new(port);
    server_config.keepalive_interval = None;
    let server_transport = WebSocketServerTransport::new(server_config);
    let mut server = McpServer::new(Box::new(server_transport), ServerConfig::new("s", "0"));
    server.register_tool(Tool::new("echo"), |args| {
        let text = args
            .and_then(|a| a.get("text").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_default();
        Ok(vec![ToolContent::text(text)])
    });
    server.start().await.unwrap();

    let mut client_config =
        WebSocketConfig::new(format!("ws://127.0.0.1:{port}/").parse().unwrap());
    client_config.keepalive_interval = None;
    client_config.reconnect_enabled = false;
    let client_transport = WebSocketTransport::new(client_config);
    let mut client = McpClient::new(Box::new(client_transport), ClientConfig::new("c", "0"));

    let negotiated = client.connect().await.unwrap();
    assert_eq!(negotiated.server_info.name, "s");
    assert_eq!(client.state(), SessionState::Ready);

    let response = client
        .call_tool("echo", Some(json!({"text": "over websocket"})))
        .await
        .unwrap();
    assert_eq!(response.content, vec![ToolContent::text("over websocket")]);

    client.ping().await.unwrap();

    client.disconnect().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn websocket_keepalive_does_not_disturb_the_session() {
    setup_test_logging();
    let port = free_port();

    // Aggressive keepalive on both ends; the session must stay clean.
    let mut server_config = WebSocketServerConfig::new(port);
    server_config.keepalive_interval = Some(std::time::Duration::from_millis(20));
    let server_transport = WebSocketServerTransport::new(server_config);
    let mut server = McpServer::new(Box::new(server_transport), ServerConfig::new("s", "0"));
    server.register_tool(Tool::new("echo"), |_| Ok(vec![ToolContent::text("ok")]));
    server.start().await.unwrap();

    let mut client_config =
        WebSocketConfig::new(format!("ws://127.0.0.1:{port}/").parse().unwrap());
    client_config.keepalive_interval = Some(std::time::Duration::from_millis(20));
    client_config.reconnect_enabled = false;
    let client_transport = WebSocketTransport::new(client_config);
    let mut client = McpClient::new(Box::new(client_transport), ClientConfig::new("c", "0"));

    client.connect().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // Several keepalive intervals later the session still works.
    let response = client.call_tool("echo", None).await.unwrap();
    assert_eq!(response.content, vec![ToolContent::text("ok")]);

    client.disconnect().await.unwrap();
    server.stop().await.unwrap();
}
