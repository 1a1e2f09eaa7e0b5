//! Session core: the substrate both roles are built on.
//!
//! A session owns the pieces shared by client and server:
//!
//! - the session state machine
//! - the local and remote [`Implementation`] values and the negotiated
//!   protocol version
//! - the pending-request table correlating outbound request ids with their
//!   completion handles
//! - the request-id generator, a per-session counter formatted as a decimal
//!   string
//!
//! The session never parses method bodies; routing and semantics live in the
//! role layers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, McpResult, ProtocolError};
use crate::messages::Implementation;

/// Lifecycle states of a session.
///
/// Transitions run monotonically toward the terminal states:
/// `Disconnected → Connecting → Initializing → Ready → Closing →
/// Disconnected`, with `Error` reachable from every live state. Skipping
/// forward along the chain is not permitted; shutdown from any live state
/// passes through `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport attached
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Handshake in progress
    Initializing,
    /// Handshake complete; requests may flow
    Ready,
    /// Orderly shutdown in progress
    Closing,
    /// The session failed terminally
    Error,
}

impl SessionState {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Initializing) => true,
            (Initializing, Ready) => true,
            (Connecting | Initializing | Ready, Closing) => true,
            (Closing, Disconnected) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Completion handle for one in-flight request.
///
/// Carries the oneshot the caller awaits and the cancellation token wired to
/// the request. Completing consumes the handle, which is what makes the
/// exactly-once invariant structural.
pub struct PendingRequest {
    sender: oneshot::Sender<McpResult<Value>>,
    cancel: CancellationToken,
}

impl PendingRequest {
    /// Create a handle and the receiving half the caller awaits.
    pub fn new(cancel: CancellationToken) -> (Self, oneshot::Receiver<McpResult<Value>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender, cancel }, receiver)
    }

    /// The cancellation token attached to this request.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Complete the request with the given outcome.
    pub fn complete(self, outcome: McpResult<Value>) {
        // The receiver may have been dropped by a caller that gave up; that
        // is not an error worth surfacing.
        let _ = self.sender.send(outcome);
    }
}

/// Shared state for one client↔server pairing over a single transport.
pub struct Session {
    state: watch::Sender<SessionState>,
    local_info: Implementation,
    remote_info: Mutex<Option<Implementation>>,
    protocol_version: Mutex<Option<String>>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    next_id: AtomicU64,
}

impl Session {
    /// Create a session for the given local implementation info.
    pub fn new(local_info: Implementation) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            state,
            local_info,
            remote_info: Mutex::new(None),
            protocol_version: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Transition to `new`, enforcing the state machine.
    pub fn set_state(&self, new: SessionState) -> McpResult<()> {
        let old = self.state();
        if old == new {
            return Ok(());
        }
        if !old.can_transition_to(new) {
            return Err(ProtocolError::StateViolation {
                from: old.to_string(),
                to: new.to_string(),
            }
            .into());
        }
        tracing::debug!(%old, %new, "session state changed");
        self.state.send_replace(new);
        Ok(())
    }

    /// Information about the local implementation.
    pub fn local_info(&self) -> &Implementation {
        &self.local_info
    }

    /// Information about the remote implementation, once learned.
    pub fn remote_info(&self) -> Option<Implementation> {
        self.remote_info.lock().expect("remote info lock").clone()
    }

    /// Record the remote implementation info.
    pub fn set_remote_info(&self, info: Implementation) {
        *self.remote_info.lock().expect("remote info lock") = Some(info);
    }

    /// The negotiated protocol version, once negotiation completed.
    pub fn protocol_version(&self) -> Option<String> {
        self.protocol_version
            .lock()
            .expect("protocol version lock")
            .clone()
    }

    /// Record the negotiated protocol version.
    pub fn set_protocol_version(&self, version: impl Into<String>) {
        *self
            .protocol_version
            .lock()
            .expect("protocol version lock") = Some(version.into());
    }

    /// Generate the next request id: a session-scoped monotonic counter
    /// formatted as a decimal string.
    pub fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Register a pending request under `id` before it is sent.
    ///
    /// Ids are never reused while an entry is outstanding; a collision is a
    /// caller bug and is rejected.
    pub fn add_pending(&self, id: impl Into<String>, handle: PendingRequest) -> McpResult<()> {
        let id = id.into();
        let mut pending = self.pending.lock().expect("pending table lock");
        if pending.contains_key(&id) {
            return Err(McpError::internal(format!(
                "request id {id} already has a pending entry"
            )));
        }
        pending.insert(id, handle);
        Ok(())
    }

    /// Consume the pending entry for `id`, if one exists.
    ///
    /// Returns `None` for unknown ids, which is how duplicate responses are
    /// detected (the first response consumed the entry).
    pub fn take_pending(&self, id: &str) -> Option<PendingRequest> {
        self.pending.lock().expect("pending table lock").remove(id)
    }

    /// Number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending table lock").len()
    }

    /// Complete every outstanding request with a cancellation error carrying
    /// `reason`, and fire each request's cancellation token.
    ///
    /// Called exactly when the transport disconnects or fails; each entry is
    /// completed exactly once because completion consumes it.
    pub fn cancel_all_pending(&self, reason: &str) {
        let drained: Vec<(String, PendingRequest)> = {
            let mut pending = self.pending.lock().expect("pending table lock");
            pending.drain().collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), reason, "cancelling pending requests");
        }
        for (id, handle) in drained {
            tracing::debug!(request_id = %id, "completing with cancellation");
            handle.cancel.cancel();
            handle.complete(Err(McpError::cancelled(reason)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_chain() {
        use SessionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Disconnected));
    }

    #[test]
    fn test_state_machine_forbids_skipping() {
        use SessionState::*;
        assert!(!Disconnected.can_transition_to(Ready));
        assert!(!Connecting.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Disconnected));
        assert!(!Ready.can_transition_to(Initializing));
        assert!(!Error.can_transition_to(Connecting));
    }

    #[test]
    fn test_error_reachable_from_live_states() {
        use SessionState::*;
        for state in [Disconnected, Connecting, Initializing, Ready, Closing] {
            assert!(state.can_transition_to(Error));
        }
    }

    #[test]
    fn test_set_state_rejects_invalid_transition() {
        let session = Session::new(Implementation::new("c", "0"));
        assert!(session.set_state(SessionState::Ready).is_err());
        assert_eq!(session.state(), SessionState::Disconnected);

        session.set_state(SessionState::Connecting).unwrap();
        session.set_state(SessionState::Initializing).unwrap();
        session.set_state(SessionState::Ready).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_state_observers_see_changes() {
        let session = Session::new(Implementation::new("c", "0"));
        let mut observer = session.subscribe_state();
        session.set_state(SessionState::Connecting).unwrap();
        assert!(observer.has_changed().unwrap());
        assert_eq!(*observer.borrow_and_update(), SessionState::Connecting);
    }

    #[test]
    fn test_request_ids_are_unique_decimal_strings() {
        let session = Session::new(Implementation::new("c", "0"));
        let first = session.next_request_id();
        let second = session.next_request_id();
        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_pending_round_trip() {
        let session = Session::new(Implementation::new("c", "0"));
        let (handle, receiver) = PendingRequest::new(CancellationToken::new());
        session.add_pending("1", handle).unwrap();
        assert_eq!(session.pending_count(), 1);

        let handle = session.take_pending("1").unwrap();
        handle.complete(Ok(serde_json::json!({"ok": true})));
        assert_eq!(session.pending_count(), 0);

        let outcome = receiver.await.unwrap().unwrap();
        assert_eq!(outcome["ok"], true);
    }

    #[test]
    fn test_duplicate_pending_id_rejected() {
        let session = Session::new(Implementation::new("c", "0"));
        let (first, _rx1) = PendingRequest::new(CancellationToken::new());
        let (second, _rx2) = PendingRequest::new(CancellationToken::new());
        session.add_pending("1", first).unwrap();
        assert!(session.add_pending("1", second).is_err());
    }

    #[test]
    fn test_take_unknown_id_returns_none() {
        let session = Session::new(Implementation::new("c", "0"));
        assert!(session.take_pending("99").is_none());
    }

    #[tokio::test]
    async fn test_cancel_all_pending_completes_each_once() {
        let session = Session::new(Implementation::new("c", "0"));
        let token = CancellationToken::new();
        let (first, rx1) = PendingRequest::new(token.clone());
        let (second, rx2) = PendingRequest::new(CancellationToken::new());
        session.add_pending("1", first).unwrap();
        session.add_pending("2", second).unwrap();

        session.cancel_all_pending("transport disconnected");
        assert_eq!(session.pending_count(), 0);
        assert!(token.is_cancelled());

        for receiver in [rx1, rx2] {
            let outcome = receiver.await.unwrap();
            assert!(matches!(outcome, Err(McpError::Cancelled { .. })));
        }
    }
}
