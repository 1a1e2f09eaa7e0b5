//! Stdio transport: newline-delimited JSON over paired byte streams.
//!
//! Two construction modes share one implementation:
//!
//! - [`StdioTransport::spawn`] launches a child process and talks JSON-RPC
//!   over its piped stdin/stdout, forwarding its stderr
//! - [`StdioTransport::attached`] wraps an existing read/write pair, which is
//!   how the socket front-end turns an accepted connection into a session
//!   transport
//!
//! Framing is one message per LF-terminated line. A malformed line raises a
//! parse error event and reading continues; a partial final line at EOF is
//! discarded silently.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use std::sync::Arc;

use super::{StdioConfig, Transport, TransportEvent, TransportShared, TransportState};
use crate::error::{McpResult, ProtocolError, TransportError};
use crate::messages::JsonRpcMessage;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

enum Mode {
    Spawn(StdioConfig),
    Attached(Option<(BoxedReader, BoxedWriter)>),
}

/// Stdio transport over a child process or an attached stream pair.
pub struct StdioTransport {
    mode: Mode,
    shared: TransportShared,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    writer: Option<Arc<Mutex<BoxedWriter>>>,
    child: Option<Child>,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioTransport {
    /// Create a transport that spawns the configured child process on
    /// connect.
    pub fn spawn(config: StdioConfig) -> Self {
        Self::with_mode(Mode::Spawn(config))
    }

    /// Create a transport over an existing stream pair.
    pub fn attached(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::with_mode(Mode::Attached(Some((Box::new(reader), Box::new(writer)))))
    }

    fn with_mode(mode: Mode) -> Self {
        let (shared, events) = TransportShared::new("stdio");
        Self {
            mode,
            shared,
            events: Some(events),
            writer: None,
            child: None,
            reader_task: None,
            stderr_task: None,
        }
    }

    /// Spawn the configured child process and return its stream ends.
    fn spawn_child(config: &StdioConfig) -> McpResult<(Child, BoxedReader, BoxedWriter)> {
        tracing::debug!(command = %config.command, args = ?config.args, "spawning child process");

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref working_dir) = config.working_dir {
            command.current_dir(working_dir);
        }
        for (key, value) in &config.environment {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| TransportError::Process {
            reason: format!("Failed to spawn {}: {e}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Process {
            reason: "Failed to capture child stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Process {
            reason: "Failed to capture child stdout".to_string(),
        })?;

        Ok((child, Box::new(stdout), Box::new(stdin)))
    }

    /// Start the line-reading loop over the inbound stream.
    fn start_reader(&mut self, reader: BoxedReader) {
        let shared = self.shared.clone();
        self.reader_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                match lines.read_line(&mut line).await {
                    Ok(0) => {
                        if !matches!(
                            shared.state(),
                            TransportState::Disconnecting | TransportState::Disconnected
                        ) {
                            tracing::debug!("stdio stream closed by peer");
                            shared.emit_error(TransportError::Closed {
                                transport_type: "stdio".to_string(),
                                reason: "stream closed".to_string(),
                            });
                            shared.set_state(TransportState::Disconnected);
                        }
                        break;
                    }
                    Ok(_) => {
                        if !line.ends_with('\n') {
                            // Partial final line at EOF; the next read will
                            // observe the EOF itself.
                            tracing::debug!("discarding partial final line");
                            continue;
                        }
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match JsonRpcMessage::decode(trimmed) {
                            Ok(message) => shared.emit_message(message),
                            Err(e) => {
                                shared.emit_error(parse_error(&e));
                            }
                        }
                    }
                    Err(e) => {
                        if !matches!(
                            shared.state(),
                            TransportState::Disconnecting | TransportState::Disconnected
                        ) {
                            shared.emit_error(TransportError::ConnectionLost {
                                transport_type: "stdio".to_string(),
                                reason: e.to_string(),
                            });
                            shared.set_state(TransportState::Error);
                        }
                        break;
                    }
                }
            }
        }));
    }

    /// Forward the child's stderr line by line.
    fn start_stderr_forwarder(&mut self, stderr: tokio::process::ChildStderr) {
        self.stderr_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut out = tokio::io::stderr();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(target: "mcp_runtime::child", "{line}");
                let _ = out.write_all(line.as_bytes()).await;
                let _ = out.write_all(b"\n").await;
            }
        }));
    }

    /// Kill the child process and wait briefly for it to exit.
    async fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::debug!(pid = ?child.id(), "terminating child process");
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill child process: {e}");
            }
            match timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "child process exited"),
                Ok(Err(e)) => tracing::warn!("error waiting for child exit: {e}"),
                Err(_) => tracing::warn!("child did not exit within timeout"),
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> &'static str {
        "stdio"
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    async fn connect(&mut self) -> McpResult<()> {
        self.shared.check_can_connect()?;
        self.shared.set_state(TransportState::Connecting);

        let (reader, writer) = match &mut self.mode {
            Mode::Spawn(config) => {
                let config = config.clone();
                match Self::spawn_child(&config) {
                    Ok((mut child, reader, writer)) => {
                        if let Some(stderr) = child.stderr.take() {
                            self.start_stderr_forwarder(stderr);
                        }
                        self.child = Some(child);
                        (reader, writer)
                    }
                    Err(e) => {
                        self.shared.set_state(TransportState::Error);
                        return Err(e);
                    }
                }
            }
            Mode::Attached(streams) => match streams.take() {
                Some(pair) => pair,
                None => {
                    self.shared.set_state(TransportState::Error);
                    return Err(TransportError::ConnectionFailed {
                        transport_type: "stdio".to_string(),
                        reason: "attached streams already consumed".to_string(),
                    }
                    .into());
                }
            },
        };

        self.writer = Some(Arc::new(Mutex::new(writer)));
        self.start_reader(reader);
        self.shared.set_state(TransportState::Connected);
        tracing::debug!("stdio transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> McpResult<()> {
        if self.shared.state() == TransportState::Disconnected {
            return Ok(());
        }
        self.shared.set_state(TransportState::Disconnecting);

        self.writer = None;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.kill_child().await;

        self.shared.set_state(TransportState::Disconnected);
        tracing::debug!("stdio transport disconnected");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> McpResult<()> {
        if self.shared.state() != TransportState::Connected {
            return Err(self.shared.not_connected("send requires Connected").into());
        }

        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| self.shared.not_connected("no write stream"))?
            .clone();

        let mut line = message.encode()?;
        line.push('\n');

        let mut guard = writer.lock().await;
        guard
            .write_all(line.as_bytes())
            .await
            .map_err(|e| send_failed(e.to_string()))?;
        guard
            .flush()
            .await
            .map_err(|e| send_failed(e.to_string()))?;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

fn parse_error(e: &ProtocolError) -> TransportError {
    TransportError::ConnectionLost {
        transport_type: "stdio".to_string(),
        reason: format!("parse error: {e}"),
    }
}

fn send_failed(reason: String) -> crate::error::McpError {
    TransportError::SendFailed {
        transport_type: "stdio".to_string(),
        reason,
    }
    .into()
}
