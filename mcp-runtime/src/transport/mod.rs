//! Transport layer abstraction and implementations.
//!
//! A transport moves encoded JSON-RPC messages between the local role and its
//! peer. Three implementations are provided:
//!
//! - **stdio**: newline-delimited JSON over paired streams, either attached
//!   to existing streams or spawning a child process
//! - **HTTP+SSE**: HTTP POST for outbound messages, a Server-Sent Events
//!   stream for inbound, with resumable reconnect
//! - **WebSocket**: bidirectional text frames with keepalive and reconnect,
//!   in both client and single-client server modes
//!
//! Every transport is a small state machine
//! (`Disconnected → Connecting → Connected → Disconnecting → Disconnected`,
//! plus `Error`) and reports everything it observes through a single-consumer
//! event stream: received messages, state changes, and errors, serialized in
//! the order they occurred.

pub mod config;
pub mod factory;

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "http-sse")]
pub mod http_sse;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use config::*;
pub use factory::*;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{McpResult, TransportError};
use crate::messages::JsonRpcMessage;

/// Connection states of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No connection exists
    Disconnected,
    /// A connection attempt (or reconnect attempt) is in progress
    Connecting,
    /// The transport is ready to carry messages
    Connected,
    /// An orderly shutdown is in progress
    Disconnecting,
    /// The transport failed terminally
    Error,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnecting => "disconnecting",
            TransportState::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Events emitted by a transport, serialized per instance.
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded message arrived from the peer
    Message(JsonRpcMessage),

    /// The transport moved between states
    StateChanged {
        /// State before the transition
        old: TransportState,
        /// State after the transition
        new: TransportState,
    },

    /// A recoverable or terminal transport error occurred
    Error(TransportError),
}

/// Core transport trait for MCP communication.
///
/// Implementations carry one JSON message per [`send`](Transport::send) call
/// and deliver everything inbound through the event receiver returned by
/// [`take_events`](Transport::take_events).
///
/// Contract:
///
/// - `send` is rejected with a transport error unless the state is
///   `Connected` (the HTTP+SSE transport additionally permits POSTs while
///   `Connecting`, so the initialize round-trip can overlap SSE setup)
/// - `disconnect` is idempotent
/// - `connect` from any state other than `Disconnected` fails immediately
#[async_trait]
pub trait Transport: Send {
    /// Short name of the transport kind, for logs and errors.
    fn transport_type(&self) -> &'static str;

    /// Current connection state.
    fn state(&self) -> TransportState;

    /// Establish the underlying connection.
    async fn connect(&mut self) -> McpResult<()>;

    /// Tear the connection down. Safe to call repeatedly.
    async fn disconnect(&mut self) -> McpResult<()>;

    /// Send one JSON-RPC message to the peer.
    ///
    /// Completion of the returned future means the message has been handed
    /// to the underlying stream's write completion, not merely queued.
    async fn send(&mut self, message: JsonRpcMessage) -> McpResult<()>;

    /// Take the single-consumer event receiver.
    ///
    /// Returns `None` after the first call; there is exactly one consumer
    /// per transport instance.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}

/// Shared bookkeeping for transport implementations: the current state and
/// the event channel, cloneable into reader/reconnect tasks.
#[derive(Clone)]
pub(crate) struct TransportShared {
    transport_type: &'static str,
    state: Arc<Mutex<TransportState>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportShared {
    /// Create the shared half and the event receiver handed to the consumer.
    pub(crate) fn new(
        transport_type: &'static str,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                transport_type,
                state: Arc::new(Mutex::new(TransportState::Disconnected)),
                events,
            },
            receiver,
        )
    }

    pub(crate) fn state(&self) -> TransportState {
        *self.state.lock().expect("transport state lock poisoned")
    }

    /// Transition to `new`, emitting a state-changed event when it differs.
    pub(crate) fn set_state(&self, new: TransportState) {
        let old = {
            let mut guard = self.state.lock().expect("transport state lock poisoned");
            std::mem::replace(&mut *guard, new)
        };
        if old != new {
            tracing::debug!(
                transport = self.transport_type,
                %old,
                %new,
                "transport state changed"
            );
            let _ = self.events.send(TransportEvent::StateChanged { old, new });
        }
    }

    pub(crate) fn emit_message(&self, message: JsonRpcMessage) {
        let _ = self.events.send(TransportEvent::Message(message));
    }

    pub(crate) fn emit_error(&self, error: TransportError) {
        tracing::warn!(transport = self.transport_type, %error, "transport error");
        let _ = self.events.send(TransportEvent::Error(error));
    }

    /// The error returned when an operation requires a state the transport
    /// is not in.
    pub(crate) fn not_connected(&self, reason: impl Into<String>) -> TransportError {
        TransportError::NotConnected {
            transport_type: self.transport_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Guard for `connect`: only legal from `Disconnected`.
    pub(crate) fn check_can_connect(&self) -> McpResult<()> {
        let state = self.state();
        if state != TransportState::Disconnected {
            return Err(TransportError::ConnectionFailed {
                transport_type: self.transport_type.to_string(),
                reason: format!("connect called in state {state}"),
            }
            .into());
        }
        Ok(())
    }
}
