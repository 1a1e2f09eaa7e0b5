//! Connection-per-session server front-end.
//!
//! A [`SocketServer`] listens on anything implementing [`SessionListener`]
//! and, for each accepted connection, builds an attached stdio-style
//! transport over the connection's streams plus a fresh [`McpServer`]. The
//! `on_session_created` callback runs before the handshake is driven, which
//! is the embedding application's window to register tools, resources, and
//! prompts on the new server. When the connection's transport terminally
//! disconnects, `on_session_closed` fires and the pair is torn down.
//!
//! [`UnixSocketListener`] is the bundled listener: it removes a stale socket
//! file on bind and unlinks the socket again on shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{McpResult, TransportError};
use crate::server::{McpServer, ServerConfig};
use crate::transport::stdio::StdioTransport;

/// Identifier of one accepted session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of inbound connections, one session each.
#[async_trait]
pub trait SessionListener: Send + 'static {
    /// The connection type produced by [`accept`](SessionListener::accept).
    type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next connection.
    async fn accept(&mut self) -> std::io::Result<Self::Conn>;

    /// Release listener resources. Called once when the front-end stops.
    fn cleanup(&mut self) {}
}

/// Unix-domain-socket listener.
#[cfg(unix)]
pub struct UnixSocketListener {
    path: std::path::PathBuf,
    listener: tokio::net::UnixListener,
}

#[cfg(unix)]
impl UnixSocketListener {
    /// Bind the socket, removing any stale socket file first.
    pub fn bind(path: impl Into<std::path::PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if path.exists() {
            tracing::debug!(path = %path.display(), "removing stale socket file");
            std::fs::remove_file(&path)?;
        }
        let listener = tokio::net::UnixListener::bind(&path)?;
        tracing::info!(path = %path.display(), "unix socket listening");
        Ok(Self { path, listener })
    }

    /// The bound socket path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(unix)]
#[async_trait]
impl SessionListener for UnixSocketListener {
    type Conn = tokio::net::UnixStream;

    async fn accept(&mut self) -> std::io::Result<Self::Conn> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    fn cleanup(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "failed to unlink socket: {e}");
            }
        }
    }
}

type SessionCreatedFn = dyn Fn(&SessionId, &McpServer) + Send + Sync;
type SessionClosedFn = dyn Fn(&SessionId) + Send + Sync;

/// Front-end accepting one MCP session per connection.
pub struct SocketServer<L: SessionListener> {
    listener: Option<L>,
    config: ServerConfig,
    on_created: Arc<SessionCreatedFn>,
    on_closed: Arc<SessionClosedFn>,
    cancel: Option<CancellationToken>,
    accept_task: Option<JoinHandle<()>>,
}

impl<L: SessionListener> SocketServer<L> {
    /// Create a front-end over a bound listener. Each accepted session's
    /// server is configured from `config`.
    pub fn new(listener: L, config: ServerConfig) -> Self {
        Self {
            listener: Some(listener),
            config,
            on_created: Arc::new(|_, _| {}),
            on_closed: Arc::new(|_| {}),
            cancel: None,
            accept_task: None,
        }
    }

    /// Install the session-created callback. Runs before the new session's
    /// handshake is driven; register tools/resources/prompts here.
    pub fn on_session_created<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SessionId, &McpServer) + Send + Sync + 'static,
    {
        self.on_created = Arc::new(callback);
        self
    }

    /// Install the session-closed callback.
    pub fn on_session_closed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SessionId) + Send + Sync + 'static,
    {
        self.on_closed = Arc::new(callback);
        self
    }

    /// Start accepting connections.
    pub fn start(&mut self) -> McpResult<()> {
        let mut listener = self.listener.take().ok_or_else(|| {
            crate::error::McpError::internal("socket server already started")
        })?;

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let config = self.config.clone();
        let on_created = Arc::clone(&self.on_created);
        let on_closed = Arc::clone(&self.on_closed);

        self.accept_task = Some(tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let conn = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("accept failed: {e}");
                        continue;
                    }
                };

                let session_id = SessionId::generate();
                tracing::info!(session = %session_id, "session accepted");

                let (read, write) = tokio::io::split(conn);
                let transport = StdioTransport::attached(read, write);
                let mut server = McpServer::new(Box::new(transport), config.clone());

                // The embedding application populates the registries before
                // the handshake can begin.
                on_created(&session_id, &server);

                if let Err(e) = server.start().await {
                    tracing::warn!(session = %session_id, "session start failed: {e}");
                    on_closed(&session_id);
                    continue;
                }

                let on_closed = Arc::clone(&on_closed);
                tokio::spawn(async move {
                    server.closed().await;
                    tracing::info!(session = %session_id, "session closed");
                    on_closed(&session_id);
                });
            }
            listener.cleanup();
        }));
        Ok(())
    }

    /// Stop accepting and release the listener (unlinking its socket).
    pub async fn stop(&mut self) -> McpResult<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.accept_task.take() {
            task.await.map_err(|e| TransportError::ConnectionLost {
                transport_type: "socket-server".to_string(),
                reason: format!("accept loop panicked: {e}"),
            })?;
        }
        Ok(())
    }
}
