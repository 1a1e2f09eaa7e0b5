//! The connection-per-session front-end driven by real clients over a Unix
//! domain socket.

#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mcp_runtime::client::{ClientConfig, McpClient};
use mcp_runtime::messages::{Tool, ToolContent};
use mcp_runtime::server::socket::{SocketServer, UnixSocketListener};
use mcp_runtime::server::ServerConfig;
use mcp_runtime::transport::stdio::StdioTransport;
use mcp_runtime_tests::setup_test_logging;
use serde_json::json;

async fn client_for(path: &std::path::Path) -> McpClient {
    let stream = tokio::net::UnixStream::connect(path).await.unwrap();
    let (read, write) = tokio::io::split(stream);
    let transport = StdioTransport::attached(read, write);
    McpClient::new(Box::new(transport), ClientConfig::new("c", "0"))
}

#[tokio::test]
async fn two_clients_get_independent_sessions() {
    setup_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mcp.sock");

    let created = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));

    let listener = UnixSocketListener::bind(&path).unwrap();
    let mut front = {
        let created = Arc::clone(&created);
        let closed = Arc::clone(&closed);
        SocketServer::new(listener, ServerConfig::new("s", "0"))
            .on_session_created(move |_id, server| {
                created.fetch_add(1, Ordering::SeqCst);
                server.register_tool(Tool::new("echo"), |args| {
                    let text = args
                        .and_then(|a| a.get("text").and_then(|t| t.as_str()).map(str::to_string))
                        .unwrap_or_default();
                    Ok(vec![ToolContent::text(text)])
                });
            })
            .on_session_closed(move |_id| {
                closed.fetch_add(1, Ordering::SeqCst);
            })
    };
    front.start().unwrap();

    let mut first = client_for(&path).await;
    let mut second = client_for(&path).await;

    first.connect().await.unwrap();
    second.connect().await.unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 2);

    let reply = first
        .call_tool("echo", Some(json!({"text": "one"})))
        .await
        .unwrap();
    assert_eq!(reply.content, vec![ToolContent::text("one")]);

    let reply = second
        .call_tool("echo", Some(json!({"text": "two"})))
        .await
        .unwrap();
    assert_eq!(reply.content, vec![ToolContent::text("two")]);

    first.disconnect().await.unwrap();
    second.disconnect().await.unwrap();

    // Both session-closed callbacks fire once the transports are gone.
    for _ in 0..100 {
        if closed.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(closed.load(Ordering::SeqCst), 2);

    front.stop().await.unwrap();
    assert!(!path.exists());
}
