//! WebSocket transport: bidirectional JSON-RPC over text frames.
//!
//! One connection carries both directions. Outbound messages are sent as
//! text frames; inbound text frames are decoded as messages. Binary frames
//! are ignored. Keepalive is an empty text frame sent every
//! `keepalive_interval` and ignored on receipt, symmetric on both ends so
//! clients and servers of this engine interoperate; standard ping/pong
//! frames from foreign peers are accepted and ignored.
//!
//! [`WebSocketTransport`] is the connecting client, with auto-reconnect.
//! [`WebSocketServerTransport`] listens for and serves exactly one client at
//! a time; excess clients are closed with "going away", upgrade requests
//! failing the configured origin or bearer-token checks are rejected with
//! 403 and 401.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use futures::stream::{SplitSink, Stream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::{
    Transport, TransportEvent, TransportShared, TransportState, WebSocketConfig,
    WebSocketServerConfig,
};
use crate::error::{McpResult, TransportError};
use crate::messages::JsonRpcMessage;

type ClientSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type ServerSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Why a socket read loop ended.
enum ReadOutcome {
    /// The stream ended or failed; reconnect policy applies
    Lost,
    /// The cancellation token fired
    Cancelled,
}

/// Consume frames until the stream ends, fails, or is cancelled.
///
/// Decoded messages and frame-level errors are emitted through `shared`.
async fn read_socket<S>(
    stream: &mut S,
    shared: &TransportShared,
    cancel: &CancellationToken,
) -> ReadOutcome
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                if text.is_empty() {
                    // Symmetric keepalive frame.
                    continue;
                }
                match JsonRpcMessage::decode(&text) {
                    Ok(message) => shared.emit_message(message),
                    Err(e) => shared.emit_error(TransportError::WebSocket {
                        reason: format!("unparseable text frame: {e}"),
                    }),
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!("ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Foreign keepalive; tolerated and ignored.
            }
            Some(Ok(Message::Close(frame))) => {
                if let Some(frame) = frame {
                    if frame.code != CloseCode::Normal && frame.code != CloseCode::Away {
                        shared.emit_error(TransportError::WebSocket {
                            reason: format!("close frame {}: {}", frame.code, frame.reason),
                        });
                    }
                }
                return ReadOutcome::Lost;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                shared.emit_error(TransportError::WebSocket {
                    reason: e.to_string(),
                });
                return ReadOutcome::Lost;
            }
            None => return ReadOutcome::Lost,
        }
    }
}

/// Periodically send empty text frames through the shared sink slot.
fn spawn_keepalive<S>(
    interval: std::time::Duration,
    sink: Arc<Mutex<Option<S>>>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let mut guard = sink.lock().await;
            if let Some(sink) = guard.as_mut() {
                if sink.send(Message::Text(String::new())).await.is_err() {
                    tracing::debug!("keepalive send failed; socket is gone");
                }
            }
        }
    })
}

/// WebSocket client transport.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    shared: TransportShared,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    sink: Arc<Mutex<Option<ClientSink>>>,
    cancel: Option<CancellationToken>,
    driver_task: Option<JoinHandle<()>>,
    keepalive_task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a new WebSocket client transport from configuration.
    pub fn new(config: WebSocketConfig) -> Self {
        let (shared, events) = TransportShared::new("websocket");
        Self {
            config,
            shared,
            events: Some(events),
            sink: Arc::new(Mutex::new(None)),
            cancel: None,
            driver_task: None,
            keepalive_task: None,
        }
    }

    /// Build the upgrade request with subprotocols and bearer auth applied.
    fn upgrade_request(
        config: &WebSocketConfig,
    ) -> McpResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request =
            config
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::InvalidConfig {
                    transport_type: "websocket".to_string(),
                    reason: e.to_string(),
                })?;

        if !config.subprotocols.is_empty() {
            let offer = config.subprotocols.join(", ");
            request.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                offer.parse().map_err(|_| TransportError::InvalidConfig {
                    transport_type: "websocket".to_string(),
                    reason: "invalid subprotocol list".to_string(),
                })?,
            );
        }
        if let Some(ref token) = config.auth_token {
            request.headers_mut().insert(
                "Authorization",
                format!("Bearer {token}")
                    .parse()
                    .map_err(|_| TransportError::InvalidConfig {
                        transport_type: "websocket".to_string(),
                        reason: "invalid auth token".to_string(),
                    })?,
            );
        }
        Ok(request)
    }

    /// Read until the socket is lost, then reconnect per policy.
    async fn run_driver(
        config: WebSocketConfig,
        shared: TransportShared,
        sink_slot: Arc<Mutex<Option<ClientSink>>>,
        initial: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        cancel: CancellationToken,
    ) {
        let mut stream = Some(initial);
        let mut attempts: u32 = 0;

        loop {
            let mut current = match stream.take() {
                Some(stream) => stream,
                None => {
                    let request = match Self::upgrade_request(&config) {
                        Ok(request) => request,
                        Err(e) => {
                            shared.emit_error(TransportError::ConnectionFailed {
                                transport_type: "websocket".to_string(),
                                reason: e.to_string(),
                            });
                            shared.set_state(TransportState::Error);
                            return;
                        }
                    };
                    let connected = tokio::select! {
                        _ = cancel.cancelled() => return,
                        connected = connect_async(request) => connected,
                    };
                    match connected {
                        Ok((ws, _response)) => {
                            attempts = 0;
                            let (sink, stream) = ws.split();
                            *sink_slot.lock().await = Some(sink);
                            shared.set_state(TransportState::Connected);
                            tracing::debug!(url = %config.url, "websocket reconnected");
                            stream
                        }
                        Err(e) => {
                            shared.emit_error(TransportError::ConnectionFailed {
                                transport_type: "websocket".to_string(),
                                reason: e.to_string(),
                            });
                            if Self::pause_before_reconnect(&config, &shared, &cancel, &mut attempts)
                                .await
                            {
                                continue;
                            }
                            return;
                        }
                    }
                }
            };

            let outcome = read_socket(&mut current, &shared, &cancel).await;
            *sink_slot.lock().await = None;

            match outcome {
                ReadOutcome::Cancelled => return,
                ReadOutcome::Lost => {
                    if !Self::pause_before_reconnect(&config, &shared, &cancel, &mut attempts).await
                    {
                        return;
                    }
                }
            }
        }
    }

    /// Apply reconnect policy. Returns false when the driver should stop.
    async fn pause_before_reconnect(
        config: &WebSocketConfig,
        shared: &TransportShared,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if !config.reconnect_enabled {
            shared.emit_error(TransportError::ConnectionLost {
                transport_type: "websocket".to_string(),
                reason: "connection lost and reconnect is disabled".to_string(),
            });
            shared.set_state(TransportState::Error);
            return false;
        }
        *attempts += 1;
        if let Some(max) = config.max_reconnect_attempts {
            if *attempts > max {
                shared.emit_error(TransportError::ConnectionLost {
                    transport_type: "websocket".to_string(),
                    reason: format!("gave up after {max} reconnect attempts"),
                });
                shared.set_state(TransportState::Error);
                return false;
            }
        }
        shared.set_state(TransportState::Connecting);
        tracing::debug!(attempt = *attempts, delay = ?config.reconnect_delay, "websocket reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(config.reconnect_delay) => true,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn transport_type(&self) -> &'static str {
        "websocket"
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    async fn connect(&mut self) -> McpResult<()> {
        self.shared.check_can_connect()?;
        self.shared.set_state(TransportState::Connecting);

        let request = Self::upgrade_request(&self.config)?;
        let (ws, _response) = connect_async(request).await.map_err(|e| {
            self.shared.set_state(TransportState::Error);
            TransportError::ConnectionFailed {
                transport_type: "websocket".to_string(),
                reason: e.to_string(),
            }
        })?;

        let (sink, stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        self.shared.set_state(TransportState::Connected);
        tracing::debug!(url = %self.config.url, "websocket connected");

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        self.driver_task = Some(tokio::spawn(Self::run_driver(
            self.config.clone(),
            self.shared.clone(),
            Arc::clone(&self.sink),
            stream,
            cancel.clone(),
        )));

        if let Some(interval) = self.config.keepalive_interval {
            if !interval.is_zero() {
                self.keepalive_task =
                    Some(spawn_keepalive(interval, Arc::clone(&self.sink), cancel));
            }
        }

        Ok(())
    }

    async fn disconnect(&mut self) -> McpResult<()> {
        if self.shared.state() == TransportState::Disconnected {
            return Ok(());
        }
        self.shared.set_state(TransportState::Disconnecting);

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        if let Some(task) = self.driver_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }

        self.shared.set_state(TransportState::Disconnected);
        tracing::debug!("websocket transport disconnected");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> McpResult<()> {
        if self.shared.state() != TransportState::Connected {
            return Err(self.shared.not_connected("send requires Connected").into());
        }
        let text = message.encode()?;
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| self.shared.not_connected("socket is gone"))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed {
                transport_type: "websocket".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.driver_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
    }
}

/// WebSocket server transport serving at most one client at a time.
pub struct WebSocketServerTransport {
    config: WebSocketServerConfig,
    shared: TransportShared,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    sink: Arc<Mutex<Option<ServerSink>>>,
    local_addr: Arc<StdMutex<Option<std::net::SocketAddr>>>,
    cancel: Option<CancellationToken>,
    accept_task: Option<JoinHandle<()>>,
    keepalive_task: Option<JoinHandle<()>>,
}

impl WebSocketServerTransport {
    /// Create a new server transport from configuration.
    pub fn new(config: WebSocketServerConfig) -> Self {
        let (shared, events) = TransportShared::new("websocket-server");
        Self {
            config,
            shared,
            events: Some(events),
            sink: Arc::new(Mutex::new(None)),
            local_addr: Arc::new(StdMutex::new(None)),
            cancel: None,
            accept_task: None,
            keepalive_task: None,
        }
    }

    /// The bound listen address, available after connect. Useful when the
    /// configured port is 0.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.lock().expect("local addr lock")
    }

    /// Validate an upgrade request against the configured policy.
    fn check_upgrade(
        config: &WebSocketServerConfig,
        request: &Request,
        mut response: Response,
    ) -> Result<Response, ErrorResponse> {
        if request.uri().path() != config.path {
            return Err(error_response(StatusCode::NOT_FOUND, "unknown path"));
        }

        if let Some(ref required) = config.required_origin {
            let origin = request
                .headers()
                .get("Origin")
                .and_then(|v| v.to_str().ok());
            if origin != Some(required.as_str()) {
                return Err(error_response(StatusCode::FORBIDDEN, "origin not allowed"));
            }
        }

        if let Some(ref token) = config.auth_token {
            let expected = format!("Bearer {token}");
            let authorization = request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok());
            if authorization != Some(expected.as_str()) {
                return Err(error_response(StatusCode::UNAUTHORIZED, "unauthorized"));
            }
        }

        if !config.subprotocols.is_empty() {
            let offered = request
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let selected = offered
                .split(',')
                .map(str::trim)
                .find(|p| config.subprotocols.iter().any(|s| s == p));
            if let Some(protocol) = selected {
                if let Ok(value) = protocol.parse() {
                    response
                        .headers_mut()
                        .insert("Sec-WebSocket-Protocol", value);
                }
            }
        }

        Ok(response)
    }

    /// Accept clients one at a time; excess clients are turned away.
    async fn run_acceptor(
        config: WebSocketServerConfig,
        listener: TcpListener,
        shared: TransportShared,
        sink_slot: Arc<Mutex<Option<ServerSink>>>,
        cancel: CancellationToken,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    shared.emit_error(TransportError::ConnectionFailed {
                        transport_type: "websocket-server".to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if sink_slot.lock().await.is_some() {
                tracing::debug!(%peer, "turning away excess websocket client");
                tokio::spawn(async move {
                    if let Ok(mut ws) = accept_async(stream).await {
                        let _ = ws
                            .close(Some(CloseFrame {
                                code: CloseCode::Away,
                                reason: "going away".into(),
                            }))
                            .await;
                    }
                });
                continue;
            }

            let check_config = config.clone();
            let callback = move |request: &Request, response: Response| {
                Self::check_upgrade(&check_config, request, response)
            };

            let ws = match accept_hdr_async(stream, callback).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(%peer, "websocket upgrade rejected: {e}");
                    continue;
                }
            };

            tracing::debug!(%peer, "websocket client connected");
            let (sink, mut stream) = ws.split();
            *sink_slot.lock().await = Some(sink);
            shared.set_state(TransportState::Connected);

            let outcome = read_socket(&mut stream, &shared, &cancel).await;
            *sink_slot.lock().await = None;

            match outcome {
                ReadOutcome::Cancelled => return,
                ReadOutcome::Lost => {
                    tracing::debug!(%peer, "websocket client disconnected");
                    shared.set_state(TransportState::Connecting);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketServerTransport {
    fn transport_type(&self) -> &'static str {
        "websocket-server"
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    async fn connect(&mut self) -> McpResult<()> {
        self.shared.check_can_connect()?;
        self.shared.set_state(TransportState::Connecting);

        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            self.shared.set_state(TransportState::Error);
            TransportError::ConnectionFailed {
                transport_type: "websocket-server".to_string(),
                reason: format!("failed to bind {bind_addr}: {e}"),
            }
        })?;
        *self.local_addr.lock().expect("local addr lock") = listener.local_addr().ok();
        tracing::debug!(addr = %bind_addr, "websocket server listening");

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        self.accept_task = Some(tokio::spawn(Self::run_acceptor(
            self.config.clone(),
            listener,
            self.shared.clone(),
            Arc::clone(&self.sink),
            cancel.clone(),
        )));

        if let Some(interval) = self.config.keepalive_interval {
            if !interval.is_zero() {
                self.keepalive_task =
                    Some(spawn_keepalive(interval, Arc::clone(&self.sink), cancel));
            }
        }

        Ok(())
    }

    async fn disconnect(&mut self) -> McpResult<()> {
        if self.shared.state() == TransportState::Disconnected {
            return Ok(());
        }
        self.shared.set_state(TransportState::Disconnecting);

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "going away".into(),
                })))
                .await;
        }
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }

        self.shared.set_state(TransportState::Disconnected);
        tracing::debug!("websocket server transport disconnected");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> McpResult<()> {
        if self.shared.state() != TransportState::Connected {
            return Err(self.shared.not_connected("no client connected").into());
        }
        let text = message.encode()?;
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| self.shared.not_connected("no client connected"))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed {
                transport_type: "websocket-server".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }
}

impl Drop for WebSocketServerTransport {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
    }
}

fn error_response(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::JsonRpcNotification;
    use std::time::Duration;

    async fn start_server(config: WebSocketServerConfig) -> (WebSocketServerTransport, mpsc::UnboundedReceiver<TransportEvent>, String) {
        let mut server = WebSocketServerTransport::new(config);
        let events = server.take_events().unwrap();
        server.connect().await.unwrap();
        let addr = server.local_addr().unwrap();
        (server, events, format!("ws://{addr}/"))
    }

    async fn next_message(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> JsonRpcMessage {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed")
            {
                TransportEvent::Message(message) => return message,
                _ => continue,
            }
        }
    }

    fn client_config(url: &str) -> WebSocketConfig {
        let mut config = WebSocketConfig::new(url.parse().unwrap());
        config.keepalive_interval = None;
        config.reconnect_enabled = false;
        config
    }

    #[tokio::test]
    async fn test_client_server_round_trip() {
        let (mut server, mut server_events, url) = start_server(WebSocketServerConfig::new(0)).await;

        let mut client = WebSocketTransport::new(client_config(&url));
        let mut client_events = client.take_events().unwrap();
        client.connect().await.unwrap();

        // Wait for the server to see the client.
        loop {
            if server.state() == TransportState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        client
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/initialized",
                None,
            )))
            .await
            .unwrap();
        let inbound = next_message(&mut server_events).await;
        assert_eq!(inbound.method(), Some("notifications/initialized"));

        server
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/tools/list_changed",
                None,
            )))
            .await
            .unwrap();
        let outbound = next_message(&mut client_events).await;
        assert_eq!(outbound.method(), Some("notifications/tools/list_changed"));

        client.disconnect().await.unwrap();
        server.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_text_keepalive_is_ignored() {
        let (_server, mut server_events, url) = start_server(WebSocketServerConfig::new(0)).await;

        // Raw client so we can inject a keepalive frame by hand.
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(String::new())).await.unwrap();
        ws.send(Message::Text(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string(),
        ))
        .await
        .unwrap();

        // The only message event is the real one.
        let message = next_message(&mut server_events).await;
        assert_eq!(message.method(), Some("notifications/initialized"));
    }

    #[tokio::test]
    async fn test_auth_required_rejects_unauthenticated_upgrade() {
        let mut config = WebSocketServerConfig::new(0);
        config.auth_token = Some("secret".to_string());
        let (_server, _events, url) = start_server(config).await;

        // No Authorization header: the upgrade must fail.
        let result = connect_async(url.as_str()).await;
        assert!(result.is_err());

        // With the token the upgrade succeeds.
        let mut client_cfg = client_config(&url);
        client_cfg.auth_token = Some("secret".to_string());
        let mut client = WebSocketTransport::new(client_cfg);
        client.connect().await.unwrap();
        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_client_turned_away() {
        let (_server, _events, url) = start_server(WebSocketServerConfig::new(0)).await;

        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        // Make sure the server has registered the first client.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (mut second, _) = connect_async(url.as_str()).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(5), second.next())
            .await
            .expect("timed out");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => {
                assert_eq!(close.code, CloseCode::Away);
            }
            other => panic!("expected going-away close frame, got {other:?}"),
        }

        let _ = first.close(None).await;
    }

    #[tokio::test]
    async fn test_origin_policy() {
        let mut config = WebSocketServerConfig::new(0);
        config.required_origin = Some("https://allowed.example".to_string());
        let (_server, _events, url) = start_server(config).await;

        // Plain connect sends no Origin header and must be rejected.
        assert!(connect_async(url.as_str()).await.is_err());

        let mut request = url.as_str().into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", "https://allowed.example".parse().unwrap());
        assert!(connect_async(request).await.is_ok());
    }
}
