//! HTTP+SSE transport: HTTP POST outbound, Server-Sent Events inbound.
//!
//! Two channels against a single base URL:
//!
//! - Every outbound message is POSTed to the configured POST endpoint. A
//!   JSON response body is delivered back as a received message, which lets
//!   request/response pairs complete even while the SSE stream is still
//!   establishing.
//! - Inbound traffic arrives on a long-lived GET of the SSE endpoint. The
//!   server's `Mcp-Session-Id` response header is captured and echoed on all
//!   subsequent requests; SSE `id:` fields are tracked and replayed as
//!   `Last-Event-ID` on reconnect; `retry:` fields update the reconnect
//!   delay.
//!
//! When the stream ends or errors while connected and reconnect is enabled,
//! the transport re-enters `Connecting`, waits out the reconnect delay, and
//! issues a fresh GET. Disconnect cancels the stream and any pending
//! reconnect timer synchronously.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{HttpSseConfig, Transport, TransportEvent, TransportShared, TransportState};
use crate::error::{McpResult, TransportError};
use crate::messages::JsonRpcMessage;

/// Header carrying the server-assigned session identifier.
const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// HTTP+SSE transport.
pub struct HttpSseTransport {
    config: HttpSseConfig,
    http_client: Client,
    shared: TransportShared,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    session_id: Arc<Mutex<Option<String>>>,
    last_event_id: Arc<Mutex<Option<String>>>,
    reconnect_delay: Arc<Mutex<Duration>>,
    cancel: Option<CancellationToken>,
    sse_task: Option<JoinHandle<()>>,
}

impl HttpSseTransport {
    /// Create a new HTTP+SSE transport from configuration.
    pub fn new(config: HttpSseConfig) -> McpResult<Self> {
        let mut builder = Client::builder();

        if !config.headers.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            for (key, value) in &config.headers {
                if let (Ok(name), Ok(value)) = (
                    key.parse::<reqwest::header::HeaderName>(),
                    reqwest::header::HeaderValue::from_str(value),
                ) {
                    headers.insert(name, value);
                }
            }
            builder = builder.default_headers(headers);
        }

        let http_client = builder.build().map_err(|e| TransportError::InvalidConfig {
            transport_type: "http-sse".to_string(),
            reason: format!("Failed to build HTTP client: {e}"),
        })?;

        let reconnect_delay = config.reconnect_delay;
        let (shared, events) = TransportShared::new("http-sse");

        Ok(Self {
            config,
            http_client,
            shared,
            events: Some(events),
            session_id: Arc::new(Mutex::new(None)),
            last_event_id: Arc::new(Mutex::new(None)),
            reconnect_delay: Arc::new(Mutex::new(reconnect_delay)),
            cancel: None,
            sse_task: None,
        })
    }

    /// The session id assigned by the server, once learned.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().expect("session id lock").clone()
    }

    /// The id of the last SSE event received, used for resumption.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().expect("event id lock").clone()
    }

    /// Drive the SSE stream, reconnecting per policy until cancelled.
    #[allow(clippy::too_many_arguments)]
    async fn run_sse_loop(
        client: Client,
        config: HttpSseConfig,
        shared: TransportShared,
        session_id: Arc<Mutex<Option<String>>>,
        last_event_id: Arc<Mutex<Option<String>>>,
        reconnect_delay: Arc<Mutex<Duration>>,
        cancel: CancellationToken,
    ) {
        let sse_url = match config.sse_url() {
            Ok(url) => url,
            Err(e) => {
                shared.emit_error(TransportError::InvalidConfig {
                    transport_type: "http-sse".to_string(),
                    reason: e.to_string(),
                });
                shared.set_state(TransportState::Error);
                return;
            }
        };

        loop {
            let mut request = client
                .get(sse_url.clone())
                .header(ACCEPT, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache");

            if let Some(ref token) = config.auth_token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if let Some(sid) = session_id.lock().expect("session id lock").clone() {
                request = request.header(SESSION_ID_HEADER, sid);
            }
            if let Some(id) = last_event_id.lock().expect("event id lock").clone() {
                tracing::debug!(last_event_id = %id, "resuming SSE stream");
                request = request.header("Last-Event-ID", id);
            }

            let response = tokio::select! {
                _ = cancel.cancelled() => return,
                response = request.send() => response,
            };

            match response {
                Ok(response) if response.status().is_success() => {
                    if let Some(sid) = header_value(response.headers(), SESSION_ID_HEADER) {
                        tracing::debug!(session_id = %sid, "captured session id from SSE response");
                        *session_id.lock().expect("session id lock") = Some(sid);
                    }
                    shared.set_state(TransportState::Connected);

                    let mut stream = response.bytes_stream().eventsource();
                    loop {
                        let event = tokio::select! {
                            _ = cancel.cancelled() => return,
                            event = stream.next() => event,
                        };
                        match event {
                            Some(Ok(event)) => {
                                if !event.id.is_empty() {
                                    *last_event_id.lock().expect("event id lock") =
                                        Some(event.id.clone());
                                }
                                if let Some(retry) = event.retry {
                                    tracing::debug!(?retry, "server updated reconnect delay");
                                    *reconnect_delay.lock().expect("delay lock") = retry;
                                }
                                if event.data.is_empty() {
                                    continue;
                                }
                                match JsonRpcMessage::decode(&event.data) {
                                    Ok(message) => shared.emit_message(message),
                                    Err(e) => shared.emit_error(TransportError::Sse {
                                        reason: format!("unparseable event: {e}"),
                                    }),
                                }
                            }
                            Some(Err(e)) => {
                                shared.emit_error(TransportError::Sse {
                                    reason: e.to_string(),
                                });
                                break;
                            }
                            None => {
                                tracing::debug!("SSE stream ended");
                                break;
                            }
                        }
                    }
                }
                Ok(response) => {
                    shared.emit_error(TransportError::Http {
                        status: response.status().as_u16(),
                        reason: "SSE endpoint returned error status".to_string(),
                    });
                }
                Err(e) => {
                    shared.emit_error(TransportError::ConnectionFailed {
                        transport_type: "http-sse".to_string(),
                        reason: e.to_string(),
                    });
                }
            }

            if cancel.is_cancelled() {
                return;
            }
            if !config.reconnect_enabled {
                shared.emit_error(TransportError::ConnectionLost {
                    transport_type: "http-sse".to_string(),
                    reason: "SSE stream lost and reconnect is disabled".to_string(),
                });
                shared.set_state(TransportState::Error);
                return;
            }

            shared.set_state(TransportState::Connecting);
            let delay = *reconnect_delay.lock().expect("delay lock");
            tracing::debug!(?delay, "reconnecting SSE stream");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
    fn transport_type(&self) -> &'static str {
        "http-sse"
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    async fn connect(&mut self) -> McpResult<()> {
        self.shared.check_can_connect()?;
        self.shared.set_state(TransportState::Connecting);

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        self.sse_task = Some(tokio::spawn(Self::run_sse_loop(
            self.http_client.clone(),
            self.config.clone(),
            self.shared.clone(),
            Arc::clone(&self.session_id),
            Arc::clone(&self.last_event_id),
            Arc::clone(&self.reconnect_delay),
            cancel,
        )));

        // Deliberately resolved while the SSE stream may still be
        // establishing; POSTs are permitted in Connecting so the initialize
        // round-trip can proceed in parallel.
        tracing::debug!(base_url = %self.config.base_url, "http-sse transport connecting");
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
        if let Some(task) = self.sse_task.take() {
            task.abort();
        }
        *self.session_id.lock().expect("session id lock") = None;

        self.shared.set_state(TransportState::Disconnected);
        tracing::debug!("http-sse transport disconnected");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> McpResult<()> {
        let state = self.shared.state();
        if state != TransportState::Connected && state != TransportState::Connecting {
            return Err(self
                .shared
                .not_connected("POST requires Connecting or Connected")
                .into());
        }

        let mut request = self
            .http_client
            .post(self.config.post_url()?)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream");

        if let Some(ref token) = self.config.auth_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(sid) = self.session_id() {
            request = request.header(SESSION_ID_HEADER, sid);
        }

        let response = request.json(&message).send().await.map_err(|e| {
            TransportError::SendFailed {
                transport_type: "http-sse".to_string(),
                reason: e.to_string(),
            }
        })?;

        if let Some(sid) = header_value(response.headers(), SESSION_ID_HEADER) {
            *self.session_id.lock().expect("session id lock") = Some(sid);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                reason: "POST rejected".to_string(),
            }
            .into());
        }

        let is_json = header_value(response.headers(), CONTENT_TYPE.as_str())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            let body = response.text().await.map_err(|e| TransportError::Http {
                status: status.as_u16(),
                reason: format!("failed to read response body: {e}"),
            })?;
            if !body.is_empty() {
                match JsonRpcMessage::decode(&body) {
                    Ok(reply) => self.shared.emit_message(reply),
                    Err(e) => {
                        self.shared.emit_error(TransportError::Http {
                            status: status.as_u16(),
                            reason: format!("unparseable response body: {e}"),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }
}

impl Drop for HttpSseTransport {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.sse_task.take() {
            task.abort();
        }
    }
}

fn header_value(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
