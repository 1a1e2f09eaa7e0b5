//! MCP client role.
//!
//! [`McpClient`] drives the client half of the protocol on top of a
//! [`Session`] and any [`Transport`]: the initialize handshake, one typed
//! method per client-to-server MCP method, and handling of everything the
//! server sends back: notifications become [`ClientEvent`]s, and
//! server-initiated requests are answered inline (`ping`, `roots/list`) or
//! surfaced to the host application (`sampling/createMessage`).
//!
//! The engine imposes no request timeouts. Callers wrap operations in their
//! own deadlines, or use [`McpClient::request_cancellable`] with a
//! [`CancellationToken`]; cancelling a pending request also notifies the
//! peer via `notifications/cancelled`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{codes, McpError, McpResult, ProtocolError};
use crate::messages::{
    CallToolRequest, CallToolResponse, Capabilities, CompleteRequest, CompleteResponse,
    CompletionArgument, CompletionRef, CreateMessageRequest, CreateMessageResponse,
    GetPromptRequest, GetPromptResponse, Implementation, InitializeRequest, InitializeResponse,
    JsonRpcErrorResponse, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListPromptsResponse, ListResourceTemplatesResponse, ListResourcesResponse, ListRootsResponse,
    ListTasksResponse, LoggingMessageParams, ProgressParams, ProtocolVersion,
    ReadResourceRequest, ReadResourceResponse, RequestId, Root, RootsCapabilities,
    SamplingCapabilities, StandardCapabilities, Task, TaskIdParams, TaskStatusParams,
    CancelledParams, ListToolsResponse,
};
use crate::session::{PendingRequest, Session, SessionState};
use crate::transport::{Transport, TransportEvent, TransportState};

/// Configuration for client behavior and identity.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Information about this client implementation
    pub client_info: Implementation,

    /// Protocol version requested during the handshake
    pub protocol_version: ProtocolVersion,

    /// Capabilities declared during the handshake
    pub capabilities: Capabilities,
}

impl ClientConfig {
    /// Create a configuration with the default client capabilities
    /// (sampling plus change-notifying roots).
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_info: Implementation::new(name, version),
            protocol_version: ProtocolVersion::default(),
            capabilities: Capabilities {
                standard: StandardCapabilities {
                    sampling: Some(SamplingCapabilities::default()),
                    roots: Some(RootsCapabilities {
                        list_changed: Some(true),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }
}

/// Observable events surfaced to the host application.
#[derive(Debug)]
pub enum ClientEvent {
    /// The server's tool list changed
    ToolListChanged,

    /// The server's resource list changed
    ResourceListChanged,

    /// The server's prompt list changed
    PromptListChanged,

    /// A subscribed resource changed
    ResourceUpdated {
        /// URI of the changed resource
        uri: String,
    },

    /// The server emitted a log message
    LogMessage(LoggingMessageParams),

    /// The server reported progress on a long-running operation
    Progress(ProgressParams),

    /// A task changed status
    TaskStatus {
        /// The updated task descriptor
        task: Task,
    },

    /// The server asked the host application to run an LLM completion.
    ///
    /// Answer with [`McpClient::respond_sampling`] or
    /// [`McpClient::reject_sampling`], quoting `request_id`.
    SamplingRequested {
        /// Id to echo when answering
        request_id: RequestId,
        /// The sampling request payload
        request: CreateMessageRequest,
    },

    /// The server fetched the roots list (already answered internally;
    /// emitted for observability)
    RootsListed,
}

/// Server-side details learned from the initialize handshake.
#[derive(Debug, Clone)]
pub struct NegotiatedServer {
    /// Server implementation info
    pub server_info: Implementation,

    /// Negotiated protocol version
    pub protocol_version: ProtocolVersion,

    /// Capabilities the server declared
    pub capabilities: Capabilities,

    /// Optional usage instructions
    pub instructions: Option<String>,
}

/// High-level MCP client.
pub struct McpClient {
    config: ClientConfig,
    session: Arc<Session>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    roots: Arc<RwLock<Vec<Root>>>,
    sampling_ids: Arc<StdMutex<HashSet<String>>>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ClientEvent>>,
    server: Arc<StdMutex<Option<NegotiatedServer>>>,
    loop_task: Option<JoinHandle<()>>,
}

impl McpClient {
    /// Create a client over the given transport.
    pub fn new(transport: Box<dyn Transport>, config: ClientConfig) -> Self {
        let session = Arc::new(Session::new(config.client_info.clone()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            session,
            transport: Arc::new(Mutex::new(transport)),
            roots: Arc::new(RwLock::new(Vec::new())),
            sampling_ids: Arc::new(StdMutex::new(HashSet::new())),
            events_tx,
            events_rx: Some(events_rx),
            server: Arc::new(StdMutex::new(None)),
            loop_task: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the handshake completed and requests may flow.
    pub fn is_ready(&self) -> bool {
        self.session.state() == SessionState::Ready
    }

    /// Details of the connected server, once the handshake completed.
    pub fn server(&self) -> Option<NegotiatedServer> {
        self.server.lock().expect("server info lock").clone()
    }

    /// Take the single-consumer client event receiver.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.take()
    }

    /// Connect the transport and run the initialize handshake.
    ///
    /// Resolves only after `notifications/initialized` has been handed to
    /// the transport's send completion, so the next outbound request cannot
    /// race an in-flight write.
    pub async fn connect(&mut self) -> McpResult<NegotiatedServer> {
        tracing::info!(client = %self.config.client_info.name, "connecting MCP client");
        self.session.set_state(SessionState::Connecting)?;

        let transport_events = {
            let mut transport = self.transport.lock().await;
            let events = transport.take_events().ok_or_else(|| {
                McpError::internal("transport event stream already consumed")
            })?;
            if let Err(e) = transport.connect().await {
                let _ = self.session.set_state(SessionState::Error);
                return Err(e);
            }
            events
        };

        self.loop_task = Some(tokio::spawn(EventLoop::run(
            transport_events,
            EventLoopContext {
                session: Arc::clone(&self.session),
                transport: Arc::clone(&self.transport),
                roots: Arc::clone(&self.roots),
                sampling_ids: Arc::clone(&self.sampling_ids),
                events: self.events_tx.clone(),
            },
        )));

        self.session.set_state(SessionState::Initializing)?;

        let init = InitializeRequest::new(
            self.config.protocol_version.clone(),
            self.config.capabilities.clone(),
            self.config.client_info.clone(),
        );
        let result = self
            .request_inner("initialize", Some(serde_json::to_value(init)?), CancellationToken::new())
            .await
            .map_err(|e| {
                let _ = self.session.set_state(SessionState::Error);
                e
            })?;

        let response: InitializeResponse =
            serde_json::from_value(result).map_err(|e| {
                let _ = self.session.set_state(SessionState::Error);
                McpError::Protocol(ProtocolError::InitializationFailed {
                    reason: format!("malformed initialize result: {e}"),
                })
            })?;

        // The server echoes the version it selected; a different string is a
        // distinct failure rather than something to silently adopt.
        if response.protocol_version != self.config.protocol_version {
            let _ = self.session.set_state(SessionState::Error);
            return Err(ProtocolError::VersionMismatch {
                requested: self.config.protocol_version.to_string(),
                negotiated: response.protocol_version.to_string(),
            }
            .into());
        }

        self.session.set_remote_info(response.server_info.clone());
        self.session
            .set_protocol_version(response.protocol_version.as_str());

        let negotiated = NegotiatedServer {
            server_info: response.server_info,
            protocol_version: response.protocol_version,
            capabilities: response.capabilities,
            instructions: response.instructions,
        };
        *self.server.lock().expect("server info lock") = Some(negotiated.clone());

        // Handed to the transport's send completion before the connect
        // future resolves; this is what keeps `notifications/initialized`
        // ahead of the first Ready-phase request on the wire.
        self.transport
            .lock()
            .await
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/initialized",
                None,
            )))
            .await?;

        self.session.set_state(SessionState::Ready)?;
        tracing::info!(server = %negotiated.server_info.name, "MCP client ready");
        Ok(negotiated)
    }

    /// Disconnect from the server and tear the session down.
    pub async fn disconnect(&mut self) -> McpResult<()> {
        tracing::info!("disconnecting MCP client");
        let _ = self.session.set_state(SessionState::Closing);
        self.session.cancel_all_pending("client disconnecting");

        self.transport.lock().await.disconnect().await?;

        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
        let _ = self.session.set_state(SessionState::Disconnected);
        Ok(())
    }

    // ---- Ready-phase request methods -----------------------------------

    /// List the server's tools.
    pub async fn list_tools(&self) -> McpResult<ListToolsResponse> {
        self.request_parsed("tools/list", None).await
    }

    /// Call a tool with a JSON-object argument payload.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
    ) -> McpResult<CallToolResponse> {
        let params = CallToolRequest {
            name: name.into(),
            arguments,
        };
        self.request_parsed("tools/call", Some(serde_json::to_value(params)?))
            .await
    }

    /// List the server's exact-URI resources.
    pub async fn list_resources(&self) -> McpResult<ListResourcesResponse> {
        self.request_parsed("resources/list", None).await
    }

    /// List the server's resource templates.
    pub async fn list_resource_templates(&self) -> McpResult<ListResourceTemplatesResponse> {
        self.request_parsed("resources/templates/list", None).await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResponse> {
        let params = ReadResourceRequest { uri: uri.into() };
        self.request_parsed("resources/read", Some(serde_json::to_value(params)?))
            .await
    }

    /// Subscribe to update notifications for a resource URI.
    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let params = ReadResourceRequest { uri: uri.into() };
        self.request_value("resources/subscribe", Some(serde_json::to_value(params)?))
            .await?;
        Ok(())
    }

    /// Remove a resource subscription.
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let params = ReadResourceRequest { uri: uri.into() };
        self.request_value("resources/unsubscribe", Some(serde_json::to_value(params)?))
            .await?;
        Ok(())
    }

    /// List the server's prompts.
    pub async fn list_prompts(&self) -> McpResult<ListPromptsResponse> {
        self.request_parsed("prompts/list", None).await
    }

    /// Render a prompt with string-valued arguments.
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<std::collections::HashMap<String, String>>,
    ) -> McpResult<GetPromptResponse> {
        let params = GetPromptRequest {
            name: name.into(),
            arguments,
        };
        self.request_parsed("prompts/get", Some(serde_json::to_value(params)?))
            .await
    }

    /// Liveness probe.
    pub async fn ping(&self) -> McpResult<()> {
        self.request_value("ping", None).await?;
        Ok(())
    }

    /// Fetch a task descriptor.
    pub async fn get_task(&self, task_id: impl Into<String>) -> McpResult<Task> {
        let params = TaskIdParams {
            task_id: task_id.into(),
        };
        self.request_parsed("tasks/get", Some(serde_json::to_value(params)?))
            .await
    }

    /// Fetch the stored result of a completed task.
    pub async fn task_result(&self, task_id: impl Into<String>) -> McpResult<CallToolResponse> {
        let params = TaskIdParams {
            task_id: task_id.into(),
        };
        self.request_parsed("tasks/result", Some(serde_json::to_value(params)?))
            .await
    }

    /// Ask the server to cancel a task.
    pub async fn cancel_task(&self, task_id: impl Into<String>) -> McpResult<()> {
        let params = TaskIdParams {
            task_id: task_id.into(),
        };
        self.request_value("tasks/cancel", Some(serde_json::to_value(params)?))
            .await?;
        Ok(())
    }

    /// List the server's active tasks.
    pub async fn list_tasks(&self) -> McpResult<ListTasksResponse> {
        self.request_parsed("tasks/list", None).await
    }

    /// Ask the server to complete a prompt or resource-template argument.
    pub async fn complete(
        &self,
        reference: CompletionRef,
        argument: CompletionArgument,
    ) -> McpResult<CompleteResponse> {
        let params = CompleteRequest {
            reference,
            argument,
        };
        self.request_parsed("completion/complete", Some(serde_json::to_value(params)?))
            .await
    }

    /// Send an arbitrary request and return the raw result value.
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.request_value(method, params).await
    }

    /// Send a request whose wait can be abandoned through `token`.
    ///
    /// On cancellation the pending entry completes with a cancellation error
    /// and `notifications/cancelled` is sent to the server carrying the
    /// original request id.
    pub async fn request_cancellable(
        &self,
        method: &str,
        params: Option<Value>,
        token: CancellationToken,
    ) -> McpResult<Value> {
        if !self.is_ready() {
            return Err(McpError::not_connected());
        }
        self.request_inner(method, params, token).await
    }

    // ---- Roots management ----------------------------------------------

    /// The current roots set.
    pub async fn roots(&self) -> Vec<Root> {
        self.roots.read().await.clone()
    }

    /// Add a root. Replaces any existing root with the same URI.
    pub async fn add_root(&self, root: Root) {
        let mut roots = self.roots.write().await;
        roots.retain(|r| r.uri != root.uri);
        roots.push(root);
    }

    /// Remove a root by URI. Returns whether one was removed.
    pub async fn remove_root(&self, uri: &str) -> bool {
        let mut roots = self.roots.write().await;
        let before = roots.len();
        roots.retain(|r| r.uri != uri);
        roots.len() != before
    }

    /// Announce that the roots set changed.
    pub async fn notify_roots_changed(&self) -> McpResult<()> {
        if !self.is_ready() {
            return Err(McpError::not_connected());
        }
        self.transport
            .lock()
            .await
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                "notifications/roots/list_changed",
                None,
            )))
            .await
    }

    // ---- Sampling answers ----------------------------------------------

    /// Answer a [`ClientEvent::SamplingRequested`] with a completion result.
    pub async fn respond_sampling(
        &self,
        request_id: &RequestId,
        result: CreateMessageResponse,
    ) -> McpResult<()> {
        self.finish_sampling(request_id)?;
        self.transport
            .lock()
            .await
            .send(JsonRpcMessage::Response(JsonRpcResponse::new(
                request_id.clone(),
                Some(serde_json::to_value(result)?),
            )))
            .await
    }

    /// Reject a [`ClientEvent::SamplingRequested`] with an error.
    pub async fn reject_sampling(
        &self,
        request_id: &RequestId,
        code: i32,
        message: impl Into<String>,
    ) -> McpResult<()> {
        self.finish_sampling(request_id)?;
        self.transport
            .lock()
            .await
            .send(JsonRpcMessage::Error(JsonRpcErrorResponse::new(
                Some(request_id.clone()),
                code,
                message,
                None,
            )))
            .await
    }

    fn finish_sampling(&self, request_id: &RequestId) -> McpResult<()> {
        let removed = self
            .sampling_ids
            .lock()
            .expect("sampling ids lock")
            .remove(&request_id.to_string());
        if !removed {
            return Err(McpError::internal(format!(
                "no outstanding sampling request with id {request_id}"
            )));
        }
        Ok(())
    }

    // ---- Internals -----------------------------------------------------

    async fn request_value(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        if !self.is_ready() {
            return Err(McpError::not_connected());
        }
        self.request_inner(method, params, CancellationToken::new())
            .await
    }

    async fn request_parsed<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<T> {
        let value = self.request_value(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            ProtocolError::InvalidResponse {
                reason: format!("malformed {method} result: {e}"),
            }
            .into()
        })
    }

    async fn request_inner(
        &self,
        method: &str,
        params: Option<Value>,
        token: CancellationToken,
    ) -> McpResult<Value> {
        let id = self.session.next_request_id();
        let (handle, receiver) = PendingRequest::new(token.clone());
        self.session.add_pending(&id, handle)?;

        tracing::debug!(%method, request_id = %id, "sending request");
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let send_result = self
            .transport
            .lock()
            .await
            .send(JsonRpcMessage::Request(request))
            .await;
        if let Err(e) = send_result {
            let _ = self.session.take_pending(&id);
            return Err(e);
        }

        tokio::select! {
            outcome = receiver => {
                outcome.map_err(|_| McpError::cancelled("completion handle dropped"))?
            }
            _ = token.cancelled() => {
                // Locally cancelled; complete the entry and tell the peer.
                let _ = self.session.take_pending(&id);
                let params = CancelledParams {
                    request_id: id.clone(),
                };
                let _ = self
                    .transport
                    .lock()
                    .await
                    .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                        "notifications/cancelled",
                        Some(serde_json::to_value(params)?),
                    )))
                    .await;
                Err(McpError::cancelled(format!("request {id} cancelled")))
            }
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
    }
}

/// Shared handles the event loop operates on.
struct EventLoopContext {
    session: Arc<Session>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    roots: Arc<RwLock<Vec<Root>>>,
    sampling_ids: Arc<StdMutex<HashSet<String>>>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

/// Inbound dispatcher: consumes transport events in wire order.
struct EventLoop;

impl EventLoop {
    async fn run(
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        ctx: EventLoopContext,
    ) {
        while let Some(event) = transport_events.recv().await {
            match event {
                TransportEvent::Message(message) => Self::handle_message(&ctx, message).await,
                TransportEvent::StateChanged { old, new } => {
                    Self::handle_transport_state(&ctx, old, new)
                }
                TransportEvent::Error(error) => {
                    tracing::debug!(%error, "transport error event");
                }
            }
        }
        tracing::debug!("client event loop finished");
    }

    fn handle_transport_state(ctx: &EventLoopContext, old: TransportState, new: TransportState) {
        match new {
            TransportState::Disconnected => {
                ctx.session.cancel_all_pending("transport disconnected");
                let _ = ctx.session.set_state(SessionState::Closing);
                let _ = ctx.session.set_state(SessionState::Disconnected);
            }
            TransportState::Error => {
                ctx.session.cancel_all_pending("transport error");
                let _ = ctx.session.set_state(SessionState::Error);
            }
            TransportState::Connecting if old == TransportState::Connected => {
                // Mid-session reconnect: responses that were in flight on
                // the lost stream will never arrive.
                ctx.session.cancel_all_pending("transport reconnecting");
            }
            _ => {}
        }
    }

    async fn handle_message(ctx: &EventLoopContext, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(response) => {
                let id = response.id.to_string();
                match ctx.session.take_pending(&id) {
                    Some(handle) => handle.complete(Ok(response.result)),
                    None => {
                        tracing::warn!(request_id = %id, "dropping response with no pending entry");
                    }
                }
            }
            JsonRpcMessage::Error(error) => match error.id {
                Some(id) => {
                    let id = id.to_string();
                    match ctx.session.take_pending(&id) {
                        Some(handle) => handle.complete(Err(McpError::Method {
                            code: error.error.code,
                            message: error.error.message,
                            data: error.error.data,
                        })),
                        None => {
                            tracing::warn!(request_id = %id, "dropping error response with no pending entry");
                        }
                    }
                }
                None => {
                    tracing::warn!(code = error.error.code, message = %error.error.message, "uncorrelated error from server");
                }
            },
            JsonRpcMessage::Notification(notification) => {
                Self::handle_notification(ctx, notification);
            }
            JsonRpcMessage::Request(request) => {
                Self::handle_server_request(ctx, request).await;
            }
        }
    }

    fn handle_notification(ctx: &EventLoopContext, notification: JsonRpcNotification) {
        let event = match notification.method.as_str() {
            "notifications/tools/list_changed" => Some(ClientEvent::ToolListChanged),
            "notifications/resources/list_changed" => Some(ClientEvent::ResourceListChanged),
            "notifications/prompts/list_changed" => Some(ClientEvent::PromptListChanged),
            "notifications/resources/updated" => notification
                .params
                .and_then(|p| serde_json::from_value::<crate::messages::ResourceUpdatedParams>(p).ok())
                .map(|p| ClientEvent::ResourceUpdated { uri: p.uri }),
            "notifications/message" => notification
                .params
                .and_then(|p| serde_json::from_value::<LoggingMessageParams>(p).ok())
                .map(ClientEvent::LogMessage),
            "notifications/progress" => notification
                .params
                .and_then(|p| serde_json::from_value::<ProgressParams>(p).ok())
                .map(ClientEvent::Progress),
            "notifications/tasks/status" => notification
                .params
                .and_then(|p| serde_json::from_value::<TaskStatusParams>(p).ok())
                .map(|p| ClientEvent::TaskStatus { task: p.task }),
            "notifications/cancelled" => {
                // The server withdrew one of its own requests; a late
                // respond_sampling for it must fail.
                if let Some(params) = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
                {
                    ctx.sampling_ids
                        .lock()
                        .expect("sampling ids lock")
                        .remove(&params.request_id);
                }
                None
            }
            other => {
                tracing::warn!(method = %other, "unknown notification from server");
                None
            }
        };
        if let Some(event) = event {
            let _ = ctx.events.send(event);
        }
    }

    async fn handle_server_request(ctx: &EventLoopContext, request: JsonRpcRequest) {
        tracing::debug!(method = %request.method, request_id = %request.id, "server-initiated request");
        let reply = match request.method.as_str() {
            "sampling/createMessage" => {
                match request
                    .params
                    .ok_or_else(|| missing_params("sampling/createMessage"))
                    .and_then(|p| {
                        serde_json::from_value::<CreateMessageRequest>(p)
                            .map_err(|e| invalid_params(e.to_string()))
                    }) {
                    Ok(parsed) => {
                        ctx.sampling_ids
                            .lock()
                            .expect("sampling ids lock")
                            .insert(request.id.to_string());
                        let _ = ctx.events.send(ClientEvent::SamplingRequested {
                            request_id: request.id,
                            request: parsed,
                        });
                        // Answered later via respond_sampling / reject_sampling.
                        return;
                    }
                    Err(e) => Some(error_reply(&request.id, &e)),
                }
            }
            "roots/list" => {
                let roots = ctx.roots.read().await.clone();
                let _ = ctx.events.send(ClientEvent::RootsListed);
                match serde_json::to_value(ListRootsResponse { roots }) {
                    Ok(result) => Some(JsonRpcMessage::Response(JsonRpcResponse::new(
                        request.id.clone(),
                        Some(result),
                    ))),
                    Err(e) => Some(error_reply(&request.id, &McpError::from(e))),
                }
            }
            "ping" => Some(JsonRpcMessage::Response(JsonRpcResponse::new(
                request.id.clone(),
                Some(serde_json::json!({})),
            ))),
            other => {
                tracing::warn!(method = %other, "unknown server-initiated method");
                Some(JsonRpcMessage::Error(JsonRpcErrorResponse::new(
                    Some(request.id.clone()),
                    codes::METHOD_NOT_FOUND,
                    "Method not found",
                    None,
                )))
            }
        };

        if let Some(reply) = reply {
            if let Err(e) = ctx.transport.lock().await.send(reply).await {
                tracing::warn!(%e, "failed to answer server-initiated request");
            }
        }
    }
}

fn missing_params(method: &str) -> McpError {
    ProtocolError::InvalidParams {
        reason: format!("{method} requires params"),
    }
    .into()
}

fn invalid_params(reason: String) -> McpError {
    ProtocolError::InvalidParams { reason }.into()
}

fn error_reply(id: &RequestId, error: &McpError) -> JsonRpcMessage {
    let (code, message, data) = error.error_object();
    JsonRpcMessage::Error(JsonRpcErrorResponse::new(
        Some(id.clone()),
        code,
        message,
        data,
    ))
}
