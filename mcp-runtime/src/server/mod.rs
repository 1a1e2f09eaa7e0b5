//! MCP server role.
//!
//! [`McpServer`] owns the registries (tools, resources, resource templates,
//! prompts, completion, tasks, subscriptions), routes inbound method calls
//! to the registered handlers, and emits the server-to-client notification
//! surface. Handlers are synchronous closures invoked on the session's
//! driver task; work that outlives a call returns through the async-task
//! mechanism ([`TaskHandle`]).
//!
//! Capabilities are never declared by hand: they are derived from what has
//! been registered at the moment the client's `initialize` arrives.

mod tasks;
#[cfg(feature = "stdio")]
pub mod socket;
pub mod template;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, McpResult, ProtocolError};
use crate::messages::{
    CallToolRequest, CallToolResponse, CancelledParams, Capabilities, CompleteRequest,
    CompleteResponse, CompletionArgument, CompletionCapabilities, CompletionRef, CompletionResult,
    CreateMessageRequest, CreateMessageResponse, GetPromptRequest, GetPromptResponse,
    Implementation, InitializeRequest, InitializeResponse, JsonRpcErrorResponse, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResponse,
    ListResourceTemplatesResponse, ListResourcesResponse, ListRootsResponse, ListTasksResponse,
    ListToolsResponse, LogLevel, LoggingMessageParams, ProgressParams, Prompt, PromptCapabilities,
    ProtocolVersion,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceCapabilities, ResourceContent,
    ResourceTemplate, ResourceUpdatedParams, StandardCapabilities, Task, TaskCapabilities,
    TaskIdParams, TaskStatus, TaskStatusParams, Tool, ToolCapabilities, ToolContent,
};
use crate::messages::resources::TemplateVariables;
use crate::session::{PendingRequest, Session, SessionState};
use crate::transport::{Transport, TransportEvent, TransportState};

use tasks::TaskRegistry;
use template::UriTemplate;

/// Handler for a synchronous tool: arguments in, content out.
pub type ToolHandler = Arc<dyn Fn(Option<Value>) -> McpResult<Vec<ToolContent>> + Send + Sync>;

/// Handler for an asynchronous tool.
///
/// Must return promptly: either `Ok(Some(content))` when the result is
/// already available (the task completes immediately), or `Ok(None)` after
/// arranging for the work to continue elsewhere, typically a spawned task
/// holding the [`TaskHandle`], which later calls
/// [`complete`](TaskHandle::complete), [`fail`](TaskHandle::fail), or
/// [`cancel`](TaskHandle::cancel).
pub type AsyncToolHandler =
    Arc<dyn Fn(Option<Value>, TaskHandle) -> McpResult<Option<Vec<ToolContent>>> + Send + Sync>;

/// Handler for an exact-URI resource read.
pub type ResourceHandler = Arc<dyn Fn(&str) -> McpResult<Vec<ResourceContent>> + Send + Sync>;

/// Handler for a template resource read; receives the matched variables.
pub type TemplateResourceHandler =
    Arc<dyn Fn(&str, TemplateVariables) -> McpResult<Vec<ResourceContent>> + Send + Sync>;

/// Handler for `prompts/get`.
pub type PromptHandler =
    Arc<dyn Fn(HashMap<String, String>) -> McpResult<GetPromptResponse> + Send + Sync>;

/// Handler for `completion/complete`.
pub type CompletionHandler =
    Arc<dyn Fn(CompletionRef, CompletionArgument) -> McpResult<CompletionResult> + Send + Sync>;

/// Configuration for server identity and negotiation.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Information about this server implementation
    pub server_info: Implementation,

    /// Protocol version this server speaks; echoed to every client
    pub protocol_version: ProtocolVersion,

    /// Optional usage instructions included in the initialize result
    pub instructions: Option<String>,
}

impl ServerConfig {
    /// Create a configuration with the current protocol version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation::new(name, version),
            protocol_version: ProtocolVersion::default(),
            instructions: None,
        }
    }

    /// Set the instructions string.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Observable server-side events.
#[derive(Debug)]
pub enum ServerEvent {
    /// The handshake completed; the client is Ready
    Initialized {
        /// The client's implementation info
        client_info: Option<Implementation>,
    },

    /// The client announced a change to its roots set
    RootsListChanged,
}

enum ToolKind {
    Sync(ToolHandler),
    Async(AsyncToolHandler),
}

struct ToolEntry {
    definition: Tool,
    kind: ToolKind,
}

struct ResourceEntry {
    definition: Resource,
    handler: ResourceHandler,
}

struct TemplateEntry {
    template: UriTemplate,
    definition: ResourceTemplate,
    handler: TemplateResourceHandler,
}

struct PromptEntry {
    definition: Prompt,
    handler: PromptHandler,
}

/// What a dispatch produced: the reply plus any notifications that must
/// follow it on the wire (e.g. a task status change caused by the call).
struct DispatchOutcome {
    reply: JsonRpcMessage,
    followups: Vec<JsonRpcMessage>,
}

/// High-level MCP server.
pub struct McpServer {
    inner: Arc<ServerInner>,
    events_rx: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    loop_task: Option<JoinHandle<()>>,
}

struct ServerInner {
    config: ServerConfig,
    session: Session,
    transport: Mutex<Box<dyn Transport>>,
    tools: RwLock<HashMap<String, ToolEntry>>,
    resources: RwLock<HashMap<String, ResourceEntry>>,
    templates: RwLock<Vec<TemplateEntry>>,
    prompts: RwLock<HashMap<String, PromptEntry>>,
    subscriptions: RwLock<HashSet<String>>,
    tasks: TaskRegistry,
    completion: RwLock<Option<CompletionHandler>>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    sampling_capable: StdMutex<bool>,
}

impl McpServer {
    /// Create a server over the given transport.
    pub fn new(transport: Box<dyn Transport>, config: ServerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session::new(config.server_info.clone());
        Self {
            inner: Arc::new(ServerInner {
                config,
                session,
                transport: Mutex::new(transport),
                tools: RwLock::new(HashMap::new()),
                resources: RwLock::new(HashMap::new()),
                templates: RwLock::new(Vec::new()),
                prompts: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashSet::new()),
                tasks: TaskRegistry::new(),
                completion: RwLock::new(None),
                events_tx,
                sampling_capable: StdMutex::new(false),
            }),
            events_rx: Some(events_rx),
            loop_task: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// The client's implementation info, once the handshake started.
    pub fn client_info(&self) -> Option<Implementation> {
        self.inner.session.remote_info()
    }

    /// Take the single-consumer server event receiver.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.events_rx.take()
    }

    // ---- Registration --------------------------------------------------

    /// Register a synchronous tool. Replaces any tool of the same name.
    pub fn register_tool<F>(&self, definition: Tool, handler: F)
    where
        F: Fn(Option<Value>) -> McpResult<Vec<ToolContent>> + Send + Sync + 'static,
    {
        let name = definition.name.clone();
        self.inner.tools.write().expect("tools lock").insert(
            name,
            ToolEntry {
                definition,
                kind: ToolKind::Sync(Arc::new(handler)),
            },
        );
    }

    /// Register an asynchronous tool. Replaces any tool of the same name.
    pub fn register_async_tool<F>(&self, definition: Tool, handler: F)
    where
        F: Fn(Option<Value>, TaskHandle) -> McpResult<Option<Vec<ToolContent>>>
            + Send
            + Sync
            + 'static,
    {
        let name = definition.name.clone();
        self.inner.tools.write().expect("tools lock").insert(
            name,
            ToolEntry {
                definition,
                kind: ToolKind::Async(Arc::new(handler)),
            },
        );
    }

    /// Register an exact-URI resource. Replaces any entry for the same URI.
    pub fn register_resource<F>(&self, definition: Resource, handler: F)
    where
        F: Fn(&str) -> McpResult<Vec<ResourceContent>> + Send + Sync + 'static,
    {
        let uri = definition.uri.clone();
        self.inner.resources.write().expect("resources lock").insert(
            uri,
            ResourceEntry {
                definition,
                handler: Arc::new(handler),
            },
        );
    }

    /// Register a resource template. Templates are tried in registration
    /// order on read; re-registering a template keeps its original position.
    pub fn register_resource_template<F>(
        &self,
        definition: ResourceTemplate,
        handler: F,
    ) -> McpResult<()>
    where
        F: Fn(&str, TemplateVariables) -> McpResult<Vec<ResourceContent>> + Send + Sync + 'static,
    {
        let template = UriTemplate::parse(definition.uri_template.clone())?;
        let entry = TemplateEntry {
            template,
            definition,
            handler: Arc::new(handler),
        };
        let mut templates = self.inner.templates.write().expect("templates lock");
        match templates
            .iter_mut()
            .find(|t| t.definition.uri_template == entry.definition.uri_template)
        {
            Some(existing) => *existing = entry,
            None => templates.push(entry),
        }
        Ok(())
    }

    /// Register a prompt. Replaces any prompt of the same name.
    pub fn register_prompt<F>(&self, definition: Prompt, handler: F)
    where
        F: Fn(HashMap<String, String>) -> McpResult<GetPromptResponse> + Send + Sync + 'static,
    {
        let name = definition.name.clone();
        self.inner.prompts.write().expect("prompts lock").insert(
            name,
            PromptEntry {
                definition,
                handler: Arc::new(handler),
            },
        );
    }

    /// Install the single `completion/complete` handler.
    pub fn set_completion_handler<F>(&self, handler: F)
    where
        F: Fn(CompletionRef, CompletionArgument) -> McpResult<CompletionResult>
            + Send
            + Sync
            + 'static,
    {
        *self.inner.completion.write().expect("completion lock") = Some(Arc::new(handler));
    }

    // ---- Lifecycle -----------------------------------------------------

    /// Connect the transport and start serving.
    pub async fn start(&mut self) -> McpResult<()> {
        tracing::info!(server = %self.inner.config.server_info.name, "starting MCP server");
        self.inner.session.set_state(SessionState::Connecting)?;

        let transport_events = {
            let mut transport = self.inner.transport.lock().await;
            let events = transport.take_events().ok_or_else(|| {
                McpError::internal("transport event stream already consumed")
            })?;
            if let Err(e) = transport.connect().await {
                let _ = self.inner.session.set_state(SessionState::Error);
                return Err(e);
            }
            events
        };

        let inner = Arc::clone(&self.inner);
        self.loop_task = Some(tokio::spawn(async move {
            ServerInner::run(inner, transport_events).await;
        }));
        Ok(())
    }

    /// Stop serving and tear the session down.
    pub async fn stop(&mut self) -> McpResult<()> {
        tracing::info!("stopping MCP server");
        let _ = self.inner.session.set_state(SessionState::Closing);
        self.inner.session.cancel_all_pending("server stopping");

        self.inner.transport.lock().await.disconnect().await?;

        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
        let _ = self.inner.session.set_state(SessionState::Disconnected);
        Ok(())
    }

    /// Wait for the serving loop to finish (transport terminally gone).
    pub async fn closed(&mut self) {
        if let Some(task) = self.loop_task.take() {
            let _ = task.await;
        }
    }

    // ---- Notifications -------------------------------------------------

    /// Announce that the tool list changed.
    pub async fn notify_tools_list_changed(&self) -> McpResult<()> {
        self.inner
            .send_notification("notifications/tools/list_changed", None)
            .await
    }

    /// Announce that the resource list changed.
    pub async fn notify_resources_list_changed(&self) -> McpResult<()> {
        self.inner
            .send_notification("notifications/resources/list_changed", None)
            .await
    }

    /// Announce that the prompt list changed.
    pub async fn notify_prompts_list_changed(&self) -> McpResult<()> {
        self.inner
            .send_notification("notifications/prompts/list_changed", None)
            .await
    }

    /// Emit `notifications/resources/updated` for `uri` if, and only if, the
    /// client currently holds a subscription for it. Returns whether a
    /// notification went out.
    pub async fn notify_resource_updated(&self, uri: &str) -> McpResult<bool> {
        let subscribed = self
            .inner
            .subscriptions
            .read()
            .expect("subscriptions lock")
            .contains(uri);
        if !subscribed {
            return Ok(false);
        }
        let params = ResourceUpdatedParams {
            uri: uri.to_string(),
        };
        self.inner
            .send_notification(
                "notifications/resources/updated",
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(true)
    }

    /// Send a log message to the client.
    pub async fn notify_log(
        &self,
        level: LogLevel,
        logger: Option<String>,
        data: Value,
    ) -> McpResult<()> {
        let params = LoggingMessageParams {
            level,
            logger,
            data,
        };
        self.inner
            .send_notification("notifications/message", Some(serde_json::to_value(params)?))
            .await
    }

    /// Report progress on a long-running operation.
    pub async fn notify_progress(
        &self,
        progress_token: Value,
        progress: f64,
        total: Option<f64>,
    ) -> McpResult<()> {
        let params = ProgressParams {
            progress_token,
            progress,
            total,
        };
        self.inner
            .send_notification("notifications/progress", Some(serde_json::to_value(params)?))
            .await
    }

    // ---- Server-initiated requests -------------------------------------

    /// Ask the client's host application for an LLM completion.
    ///
    /// Fails fast when the connected client did not declare the `sampling`
    /// capability during the handshake.
    pub async fn request_sampling(
        &self,
        request: CreateMessageRequest,
    ) -> McpResult<CreateMessageResponse> {
        if !*self
            .inner
            .sampling_capable
            .lock()
            .expect("sampling flag lock")
        {
            return Err(McpError::internal(
                "client did not declare the sampling capability",
            ));
        }
        let result = self
            .inner
            .server_request("sampling/createMessage", Some(serde_json::to_value(request)?))
            .await?;
        serde_json::from_value(result).map_err(|e| {
            ProtocolError::InvalidResponse {
                reason: format!("malformed sampling result: {e}"),
            }
            .into()
        })
    }

    /// Fetch the client's roots set.
    pub async fn list_roots(&self) -> McpResult<ListRootsResponse> {
        let result = self.inner.server_request("roots/list", None).await?;
        serde_json::from_value(result).map_err(|e| {
            ProtocolError::InvalidResponse {
                reason: format!("malformed roots result: {e}"),
            }
            .into()
        })
    }

    /// Send a ping to the client.
    pub async fn ping(&self) -> McpResult<()> {
        self.inner.server_request("ping", None).await?;
        Ok(())
    }

    // ---- Task control --------------------------------------------------

    /// Mark a task completed and store its result.
    pub async fn complete_task(
        &self,
        task_id: &str,
        content: Vec<ToolContent>,
    ) -> McpResult<()> {
        self.inner.finish_task(task_id, TaskStatus::Completed, None, Some(content))
            .await
    }

    /// Mark a task failed.
    pub async fn fail_task(&self, task_id: &str, message: impl Into<String>) -> McpResult<()> {
        self.inner
            .finish_task(task_id, TaskStatus::Failed, Some(message.into()), None)
            .await
    }

    /// Cancel a task.
    pub async fn cancel_task(&self, task_id: &str) -> McpResult<()> {
        self.inner
            .finish_task(task_id, TaskStatus::Cancelled, None, None)
            .await
    }
}

impl Drop for McpServer {
    fn drop(&mut self) {
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
    }
}

/// Handle to one running task, given to async tool handlers.
///
/// Cheap to clone and safe to move into spawned work; every status change
/// goes through the registry's transition rules and is announced to the
/// client via `notifications/tasks/status`.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<ServerInner>,
    task_id: String,
}

impl TaskHandle {
    /// The id of the task this handle controls.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Complete the task with its result content.
    pub async fn complete(&self, content: Vec<ToolContent>) -> McpResult<()> {
        self.inner
            .finish_task(&self.task_id, TaskStatus::Completed, None, Some(content))
            .await
    }

    /// Fail the task with a message.
    pub async fn fail(&self, message: impl Into<String>) -> McpResult<()> {
        self.inner
            .finish_task(&self.task_id, TaskStatus::Failed, Some(message.into()), None)
            .await
    }

    /// Cancel the task.
    pub async fn cancel(&self) -> McpResult<()> {
        self.inner
            .finish_task(&self.task_id, TaskStatus::Cancelled, None, None)
            .await
    }

    /// Mark the task as waiting for further input.
    pub async fn require_input(&self) -> McpResult<()> {
        self.inner
            .finish_task(&self.task_id, TaskStatus::InputRequired, None, None)
            .await
    }

    /// Resume a task that was waiting for input.
    pub async fn resume(&self) -> McpResult<()> {
        self.inner
            .finish_task(&self.task_id, TaskStatus::Working, None, None)
            .await
    }
}

impl ServerInner {
    async fn run(inner: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Message(message) => {
                    Self::handle_message(&inner, message).await;
                }
                TransportEvent::StateChanged { old, new } => {
                    inner.handle_transport_state(old, new);
                    if new == TransportState::Disconnected || new == TransportState::Error {
                        // Terminal for this session.
                        break;
                    }
                }
                TransportEvent::Error(error) => {
                    tracing::debug!(%error, "transport error event");
                }
            }
        }
        tracing::debug!("server event loop finished");
    }

    fn handle_transport_state(&self, old: TransportState, new: TransportState) {
        match new {
            TransportState::Disconnected => {
                self.session.cancel_all_pending("transport disconnected");
                let _ = self.session.set_state(SessionState::Closing);
                let _ = self.session.set_state(SessionState::Disconnected);
            }
            TransportState::Error => {
                self.session.cancel_all_pending("transport error");
                let _ = self.session.set_state(SessionState::Error);
            }
            TransportState::Connecting if old == TransportState::Connected => {
                self.session.cancel_all_pending("transport reconnecting");
            }
            _ => {}
        }
    }

    async fn handle_message(inner: &Arc<Self>, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Request(request) => {
                let outcome = Self::dispatch(inner, request);
                inner.send_message(outcome.reply).await;
                for followup in outcome.followups {
                    inner.send_message(followup).await;
                }
            }
            JsonRpcMessage::Notification(notification) => {
                inner.handle_notification(notification);
            }
            JsonRpcMessage::Response(response) => {
                let id = response.id.to_string();
                match inner.session.take_pending(&id) {
                    Some(handle) => handle.complete(Ok(response.result)),
                    None => {
                        tracing::warn!(request_id = %id, "dropping response with no pending entry");
                    }
                }
            }
            JsonRpcMessage::Error(error) => match error.id {
                Some(id) => {
                    let id = id.to_string();
                    match inner.session.take_pending(&id) {
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
                    tracing::warn!(code = error.error.code, "uncorrelated error from client");
                }
            },
        }
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                if self.session.state() == SessionState::Initializing {
                    let _ = self.session.set_state(SessionState::Ready);
                    tracing::info!("MCP server session ready");
                    let _ = self.events_tx.send(ServerEvent::Initialized {
                        client_info: self.session.remote_info(),
                    });
                } else {
                    tracing::warn!("unexpected notifications/initialized");
                }
            }
            "notifications/cancelled" => {
                let request_id = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
                    .map(|p| p.request_id);
                match request_id {
                    Some(id) => match self.session.take_pending(&id) {
                        Some(handle) => {
                            handle.complete(Err(McpError::cancelled("cancelled by peer")))
                        }
                        None => {
                            tracing::debug!(request_id = %id, "cancellation for unknown request");
                        }
                    },
                    None => tracing::warn!("malformed notifications/cancelled"),
                }
            }
            "notifications/roots/list_changed" => {
                let _ = self.events_tx.send(ServerEvent::RootsListChanged);
            }
            other => {
                tracing::warn!(method = %other, "unknown notification from client");
            }
        }
    }

    /// Route one request to its handler and build the reply.
    fn dispatch(inner: &Arc<Self>, request: JsonRpcRequest) -> DispatchOutcome {
        tracing::debug!(method = %request.method, request_id = %request.id, "dispatching request");
        let id = request.id.clone();
        let mut followups = Vec::new();

        let result: McpResult<Value> = match request.method.as_str() {
            "initialize" => inner.handle_initialize(request.params),
            "ping" => Ok(serde_json::json!({})),
            _ if inner.session.state() != SessionState::Ready => Err(McpError::not_connected()),
            "tools/list" => inner.handle_list_tools(),
            "tools/call" => Self::handle_call_tool(inner, request.params, &mut followups),
            "resources/list" => inner.handle_list_resources(),
            "resources/templates/list" => inner.handle_list_resource_templates(),
            "resources/read" => inner.handle_read_resource(request.params),
            "resources/subscribe" => inner.handle_subscribe(request.params, true),
            "resources/unsubscribe" => inner.handle_subscribe(request.params, false),
            "prompts/list" => inner.handle_list_prompts(),
            "prompts/get" => inner.handle_get_prompt(request.params),
            "completion/complete" => inner.handle_complete(request.params),
            "tasks/get" => inner.handle_task_get(request.params),
            "tasks/result" => inner.handle_task_result(request.params),
            "tasks/cancel" => inner.handle_task_cancel(request.params, &mut followups),
            "tasks/list" => inner.handle_task_list(),
            method => Err(ProtocolError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        let reply = match result {
            Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(id, Some(value))),
            Err(error) => {
                let (code, message, data) = error.error_object();
                tracing::debug!(code, %message, "request failed");
                JsonRpcMessage::Error(JsonRpcErrorResponse::new(Some(id), code, message, data))
            }
        };

        DispatchOutcome { reply, followups }
    }

    fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        if self.session.state() != SessionState::Connecting {
            return Err(ProtocolError::InitializationFailed {
                reason: "initialize received outside Connecting".to_string(),
            }
            .into());
        }

        let request: InitializeRequest = parse_params(params, "initialize")?;
        tracing::info!(
            client = %request.client_info.name,
            requested_version = %request.protocol_version,
            "initialize received"
        );
        self.session.set_remote_info(request.client_info);
        *self.sampling_capable.lock().expect("sampling flag lock") =
            request.capabilities.standard.sampling.is_some();

        // Server-chosen version: this server always answers with its own.
        let negotiated = self.config.protocol_version.clone();
        self.session.set_protocol_version(negotiated.as_str());

        let response = InitializeResponse {
            protocol_version: negotiated,
            capabilities: self.derive_capabilities(),
            server_info: self.config.server_info.clone(),
            instructions: self.config.instructions.clone(),
        };

        self.session.set_state(SessionState::Initializing)?;
        Ok(serde_json::to_value(response)?)
    }

    /// Capabilities follow from the registries, never from configuration.
    fn derive_capabilities(&self) -> Capabilities {
        let tools = self.tools.read().expect("tools lock");
        let has_tools = !tools.is_empty();
        let has_async_tools = tools
            .values()
            .any(|entry| matches!(entry.kind, ToolKind::Async(_)));
        drop(tools);

        let has_resources = !self.resources.read().expect("resources lock").is_empty()
            || !self.templates.read().expect("templates lock").is_empty();
        let has_prompts = !self.prompts.read().expect("prompts lock").is_empty();
        let has_completion = self.completion.read().expect("completion lock").is_some();

        Capabilities {
            standard: StandardCapabilities {
                tools: has_tools.then(|| ToolCapabilities {
                    list_changed: Some(true),
                }),
                resources: has_resources.then(|| ResourceCapabilities {
                    subscribe: Some(true),
                    list_changed: Some(true),
                }),
                prompts: has_prompts.then(|| PromptCapabilities {
                    list_changed: Some(true),
                }),
                tasks: has_async_tools.then(TaskCapabilities::default),
                completions: has_completion.then(CompletionCapabilities::default),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn handle_list_tools(&self) -> McpResult<Value> {
        let mut tools: Vec<Tool> = self
            .tools
            .read()
            .expect("tools lock")
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(serde_json::to_value(ListToolsResponse { tools })?)
    }

    fn handle_call_tool(
        inner: &Arc<Self>,
        params: Option<Value>,
        followups: &mut Vec<JsonRpcMessage>,
    ) -> McpResult<Value> {
        let request: CallToolRequest = parse_params(params, "tools/call")?;

        let kind = {
            let tools = inner.tools.read().expect("tools lock");
            let entry = tools
                .get(&request.name)
                .ok_or_else(|| ProtocolError::MethodNotFound {
                    method: format!("tool {}", request.name),
                })?;
            match &entry.kind {
                ToolKind::Sync(handler) => ToolKind::Sync(Arc::clone(handler)),
                ToolKind::Async(handler) => ToolKind::Async(Arc::clone(handler)),
            }
        };

        match kind {
            ToolKind::Sync(handler) => {
                let content = handler(request.arguments)?;
                Ok(serde_json::to_value(CallToolResponse::content(content))?)
            }
            ToolKind::Async(handler) => {
                let task = inner.tasks.create(&request.name);
                let handle = TaskHandle {
                    inner: Arc::clone(inner),
                    task_id: task.task_id.clone(),
                };

                match handler(request.arguments, handle) {
                    Ok(Some(content)) => {
                        // Rare path: the handler finished inline.
                        let stored = CallToolResponse::content(content.clone());
                        let updated = inner.tasks.transition(
                            &task.task_id,
                            TaskStatus::Completed,
                            None,
                            Some(stored),
                        )?;
                        followups.push(task_status_notification(&updated)?);
                        Ok(serde_json::to_value(CallToolResponse {
                            content,
                            is_error: Some(false),
                            task: Some(updated),
                        })?)
                    }
                    Ok(None) => Ok(serde_json::to_value(CallToolResponse {
                        content: Vec::new(),
                        is_error: None,
                        task: Some(task),
                    })?),
                    Err(e) => {
                        let failed = inner.tasks.transition(
                            &task.task_id,
                            TaskStatus::Failed,
                            Some(e.to_string()),
                            None,
                        )?;
                        followups.push(task_status_notification(&failed)?);
                        Err(e)
                    }
                }
            }
        }
    }

    fn handle_list_resources(&self) -> McpResult<Value> {
        let mut resources: Vec<Resource> = self
            .resources
            .read()
            .expect("resources lock")
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(serde_json::to_value(ListResourcesResponse { resources })?)
    }

    fn handle_list_resource_templates(&self) -> McpResult<Value> {
        let resource_templates: Vec<ResourceTemplate> = self
            .templates
            .read()
            .expect("templates lock")
            .iter()
            .map(|entry| entry.definition.clone())
            .collect();
        Ok(serde_json::to_value(ListResourceTemplatesResponse {
            resource_templates,
        })?)
    }

    fn handle_read_resource(&self, params: Option<Value>) -> McpResult<Value> {
        let request: ReadResourceRequest = parse_params(params, "resources/read")?;
        let uri = request.uri;

        let exact = self
            .resources
            .read()
            .expect("resources lock")
            .get(&uri)
            .map(|entry| Arc::clone(&entry.handler));
        if let Some(handler) = exact {
            let contents = handler(&uri)?;
            return Ok(serde_json::to_value(ReadResourceResponse { contents })?);
        }

        // First matching template in registration order wins.
        let matched = {
            let templates = self.templates.read().expect("templates lock");
            templates.iter().find_map(|entry| {
                entry
                    .template
                    .matches(&uri)
                    .map(|vars| (Arc::clone(&entry.handler), vars))
            })
        };
        if let Some((handler, vars)) = matched {
            let contents = handler(&uri, vars)?;
            return Ok(serde_json::to_value(ReadResourceResponse { contents })?);
        }

        Err(ProtocolError::InvalidParams {
            reason: "Resource not found".to_string(),
        }
        .into())
    }

    fn handle_subscribe(&self, params: Option<Value>, subscribe: bool) -> McpResult<Value> {
        let method = if subscribe {
            "resources/subscribe"
        } else {
            "resources/unsubscribe"
        };
        let request: ReadResourceRequest = parse_params(params, method)?;
        let mut subscriptions = self.subscriptions.write().expect("subscriptions lock");
        if subscribe {
            subscriptions.insert(request.uri);
        } else {
            // Unsubscribing an unknown URI is a no-op success.
            subscriptions.remove(&request.uri);
        }
        Ok(serde_json::json!({}))
    }

    fn handle_list_prompts(&self) -> McpResult<Value> {
        let mut prompts: Vec<Prompt> = self
            .prompts
            .read()
            .expect("prompts lock")
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(serde_json::to_value(ListPromptsResponse { prompts })?)
    }

    fn handle_get_prompt(&self, params: Option<Value>) -> McpResult<Value> {
        let request: GetPromptRequest = parse_params(params, "prompts/get")?;
        let handler = self
            .prompts
            .read()
            .expect("prompts lock")
            .get(&request.name)
            .map(|entry| Arc::clone(&entry.handler))
            .ok_or_else(|| ProtocolError::MethodNotFound {
                method: format!("prompt {}", request.name),
            })?;
        let response = handler(request.arguments.unwrap_or_default())?;
        Ok(serde_json::to_value(response)?)
    }

    fn handle_complete(&self, params: Option<Value>) -> McpResult<Value> {
        let request: CompleteRequest = parse_params(params, "completion/complete")?;
        let handler = self
            .completion
            .read()
            .expect("completion lock")
            .clone()
            .ok_or_else(|| ProtocolError::MethodNotFound {
                method: "completion/complete".to_string(),
            })?;
        let completion = handler(request.reference, request.argument)?;
        Ok(serde_json::to_value(CompleteResponse { completion })?)
    }

    fn handle_task_get(&self, params: Option<Value>) -> McpResult<Value> {
        let request: TaskIdParams = parse_params(params, "tasks/get")?;
        let task = self.tasks.get(&request.task_id)?;
        Ok(serde_json::to_value(task)?)
    }

    fn handle_task_result(&self, params: Option<Value>) -> McpResult<Value> {
        let request: TaskIdParams = parse_params(params, "tasks/result")?;
        let result = self.tasks.result(&request.task_id)?;
        Ok(serde_json::to_value(result)?)
    }

    fn handle_task_cancel(
        &self,
        params: Option<Value>,
        followups: &mut Vec<JsonRpcMessage>,
    ) -> McpResult<Value> {
        let request: TaskIdParams = parse_params(params, "tasks/cancel")?;
        let updated = self
            .tasks
            .transition(&request.task_id, TaskStatus::Cancelled, None, None)?;
        followups.push(task_status_notification(&updated)?);
        Ok(serde_json::json!({}))
    }

    fn handle_task_list(&self) -> McpResult<Value> {
        Ok(serde_json::to_value(ListTasksResponse {
            tasks: self.tasks.list(),
        })?)
    }

    /// Transition a task and announce the change.
    async fn finish_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: Option<String>,
        content: Option<Vec<ToolContent>>,
    ) -> McpResult<()> {
        let result = content.map(CallToolResponse::content);
        let updated = self.tasks.transition(task_id, status, message, result)?;
        self.send_message(task_status_notification(&updated)?).await;
        Ok(())
    }

    /// Allocate an id, register a pending entry, send, and await the answer.
    async fn server_request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        if self.session.state() != SessionState::Ready {
            return Err(McpError::not_connected());
        }

        let id = self.session.next_request_id();
        let (handle, receiver) = PendingRequest::new(CancellationToken::new());
        self.session.add_pending(&id, handle)?;

        tracing::debug!(%method, request_id = %id, "sending server-initiated request");
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let send_result = {
            let mut transport = self.transport.lock().await;
            transport.send(JsonRpcMessage::Request(request)).await
        };
        if let Err(e) = send_result {
            let _ = self.session.take_pending(&id);
            return Err(e);
        }

        receiver
            .await
            .map_err(|_| McpError::cancelled("completion handle dropped"))?
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        if self.session.state() != SessionState::Ready {
            return Err(McpError::not_connected());
        }
        let mut transport = self.transport.lock().await;
        transport
            .send(JsonRpcMessage::Notification(JsonRpcNotification::new(
                method, params,
            )))
            .await
    }

    /// Best-effort send used by the dispatcher; failures are logged, the
    /// transport's own events carry the real error.
    async fn send_message(&self, message: JsonRpcMessage) {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.send(message).await {
            tracing::warn!(%e, "failed to send message");
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>,
    method: &str,
) -> McpResult<T> {
    let params = params.ok_or_else(|| ProtocolError::InvalidParams {
        reason: format!("{method} requires params"),
    })?;
    serde_json::from_value(params).map_err(|e| {
        ProtocolError::InvalidParams {
            reason: format!("malformed {method} params: {e}"),
        }
        .into()
    })
}

fn task_status_notification(task: &Task) -> McpResult<JsonRpcMessage> {
    Ok(JsonRpcMessage::Notification(JsonRpcNotification::new(
        "notifications/tasks/status",
        Some(serde_json::to_value(TaskStatusParams { task: task.clone() })?),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stdio::StdioTransport;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Scripted client driving the server over a duplex pipe.
    struct ScriptedClient {
        reader: BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
        writer: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    }

    impl ScriptedClient {
        fn over(stream: tokio::io::DuplexStream) -> Self {
            let (reader, writer) = tokio::io::split(stream);
            Self {
                reader: BufReader::new(reader),
                writer,
            }
        }

        async fn send(&mut self, value: Value) {
            let mut line = serde_json::to_string(&value).unwrap();
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn handshake(&mut self) {
            self.send(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-11-25",
                    "capabilities": {"sampling": {}},
                    "clientInfo": {"name": "c", "version": "0"}
                }
            }))
            .await;
            let reply = self.recv().await;
            assert_eq!(reply["id"], "1");
            assert!(reply["result"]["protocolVersion"].is_string());
            self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .await;
        }
    }

    async fn server_over_duplex(config: ServerConfig) -> (McpServer, ScriptedClient) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let (read, write) = tokio::io::split(near);
        let transport = StdioTransport::attached(read, write);
        let server = McpServer::new(Box::new(transport), config);
        (server, ScriptedClient::over(far))
    }

    async fn wait_ready(server: &McpServer) {
        for _ in 0..100 {
            if server.state() == SessionState::Ready {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("server never reached Ready");
    }

    fn echo_server_config() -> ServerConfig {
        ServerConfig::new("s", "0")
    }

    #[tokio::test]
    async fn test_initialize_handshake_wire_shape() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.register_tool(Tool::new("echo"), |args| {
            let text = args
                .and_then(|a| a.get("text").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            Ok(vec![ToolContent::text(text)])
        });
        server.start().await.unwrap();

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-11-25",
                    "capabilities": {},
                    "clientInfo": {"name": "c", "version": "0"}
                }
            }))
            .await;

        let reply = client.recv().await;
        assert_eq!(
            reply,
            json!({
                "jsonrpc": "2.0",
                "id": "1",
                "result": {
                    "protocolVersion": "2025-11-25",
                    "capabilities": {"tools": {"listChanged": true}},
                    "serverInfo": {"name": "s", "version": "0"}
                }
            })
        );

        client
            .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        wait_ready(&server).await;
    }

    #[tokio::test]
    async fn test_echo_tool_call() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.register_tool(Tool::new("echo"), |args| {
            let text = args
                .and_then(|a| a.get("text").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            Ok(vec![ToolContent::text(text)])
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "2",
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"text": "hi"}}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(
            reply,
            json!({
                "jsonrpc": "2.0",
                "id": "2",
                "result": {"content": [{"type": "text", "text": "hi"}], "isError": false}
            })
        );
    }

    #[tokio::test]
    async fn test_template_resource_read() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server
            .register_resource_template(
                ResourceTemplate::new("file:///notes/{id}"),
                |uri, vars| {
                    let id = vars.get("id").cloned().unwrap_or_default();
                    Ok(vec![ResourceContent::text(uri, format!("note:{id}"))])
                },
            )
            .unwrap();
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "3",
                "method": "resources/read",
                "params": {"uri": "file:///notes/42"}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(
            reply["result"],
            json!({"contents": [{"uri": "file:///notes/42", "text": "note:42"}]})
        );

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "4",
                "method": "resources/read",
                "params": {"uri": "file:///other"}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["error"]["code"], -32602);
        assert_eq!(reply["error"]["message"], "Resource not found");
    }

    #[tokio::test]
    async fn test_exact_resource_wins_over_template() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server
            .register_resource_template(ResourceTemplate::new("file:///{rest}"), |uri, _| {
                Ok(vec![ResourceContent::text(uri, "template")])
            })
            .unwrap();
        server.register_resource(Resource::new("file:///exact"), |uri| {
            Ok(vec![ResourceContent::text(uri, "exact")])
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "5",
                "method": "resources/read",
                "params": {"uri": "file:///exact"}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["result"]["contents"][0]["text"], "exact");
    }

    #[tokio::test]
    async fn test_first_matching_template_wins() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server
            .register_resource_template(ResourceTemplate::new("x://{a}"), |uri, _| {
                Ok(vec![ResourceContent::text(uri, "first")])
            })
            .unwrap();
        server
            .register_resource_template(ResourceTemplate::new("x://{b}"), |uri, _| {
                Ok(vec![ResourceContent::text(uri, "second")])
            })
            .unwrap();
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "6",
                "method": "resources/read",
                "params": {"uri": "x://anything"}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["result"]["contents"][0]["text"], "first");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({"jsonrpc": "2.0", "id": "9", "method": "does/not/exist"}))
            .await;
        let reply = client.recv().await;
        assert_eq!(
            reply,
            json!({
                "jsonrpc": "2.0",
                "id": "9",
                "error": {"code": -32601, "message": "Unknown method"}
            })
        );
    }

    #[tokio::test]
    async fn test_requests_before_ready_rejected() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.start().await.unwrap();

        client
            .send(json!({"jsonrpc": "2.0", "id": "1", "method": "tools/list"}))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["error"]["code"], -32603);
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not connected"));
    }

    #[tokio::test]
    async fn test_async_task_lifecycle() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        let (handle_tx, mut handle_rx) = mpsc::unbounded_channel::<TaskHandle>();
        server.register_async_tool(Tool::new("slow-echo"), move |_args, handle| {
            handle_tx.send(handle).unwrap();
            Ok(None)
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        // The call returns immediately with a working task descriptor.
        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "2",
                "method": "tools/call",
                "params": {"name": "slow-echo", "arguments": {}}
            }))
            .await;
        let reply = client.recv().await;
        let task_id = reply["result"]["task"]["taskId"].as_str().unwrap().to_string();
        assert_eq!(reply["result"]["task"]["status"], "working");

        // Result before completion: invalid params.
        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "3",
                "method": "tasks/result",
                "params": {"taskId": task_id}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["error"]["code"], -32602);
        assert_eq!(reply["error"]["message"], "Task not yet completed");

        // Complete from "another thread".
        let handle = handle_rx.recv().await.unwrap();
        handle
            .complete(vec![ToolContent::text("done")])
            .await
            .unwrap();

        // Status notification arrives.
        let notification = client.recv().await;
        assert_eq!(notification["method"], "notifications/tasks/status");
        assert_eq!(notification["params"]["task"]["status"], "completed");

        // Stored result now retrievable.
        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "4",
                "method": "tasks/result",
                "params": {"taskId": task_id}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["result"]["content"][0]["text"], "done");
    }

    #[tokio::test]
    async fn test_async_tool_inline_completion() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.register_async_tool(Tool::new("fast"), |_args, _handle| {
            Ok(Some(vec![ToolContent::text("immediate")]))
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "2",
                "method": "tools/call",
                "params": {"name": "fast"}
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["result"]["content"][0]["text"], "immediate");
        assert_eq!(reply["result"]["task"]["status"], "completed");

        // The inline completion is also announced.
        let notification = client.recv().await;
        assert_eq!(notification["method"], "notifications/tasks/status");
        assert_eq!(notification["params"]["task"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_subscription_gates_update_notifications() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.register_resource(Resource::new("file:///watched"), |uri| {
            Ok(vec![ResourceContent::text(uri, "content")])
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        // Not subscribed: nothing goes out.
        assert!(!server.notify_resource_updated("file:///watched").await.unwrap());

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "2",
                "method": "resources/subscribe",
                "params": {"uri": "file:///watched"}
            }))
            .await;
        assert_eq!(client.recv().await["result"], json!({}));

        assert!(server.notify_resource_updated("file:///watched").await.unwrap());
        let notification = client.recv().await;
        assert_eq!(notification["method"], "notifications/resources/updated");
        assert_eq!(notification["params"]["uri"], "file:///watched");

        // Unsubscribe is idempotent and stops notifications.
        for _ in 0..2 {
            client
                .send(json!({
                    "jsonrpc": "2.0",
                    "id": "3",
                    "method": "resources/unsubscribe",
                    "params": {"uri": "file:///watched"}
                }))
                .await;
            assert_eq!(client.recv().await["result"], json!({}));
        }
        assert!(!server.notify_resource_updated("file:///watched").await.unwrap());
    }

    #[tokio::test]
    async fn test_registration_replaces_prior_entry() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.register_tool(Tool::new("tool").with_description("first"), |_| {
            Ok(vec![ToolContent::text("first")])
        });
        server.register_tool(Tool::new("tool").with_description("second"), |_| {
            Ok(vec![ToolContent::text("second")])
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({"jsonrpc": "2.0", "id": "2", "method": "tools/list"}))
            .await;
        let reply = client.recv().await;
        let tools = reply["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["description"], "second");

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "3",
                "method": "tools/call",
                "params": {"name": "tool"}
            }))
            .await;
        assert_eq!(client.recv().await["result"]["content"][0]["text"], "second");
    }

    #[tokio::test]
    async fn test_completion_handler() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.set_completion_handler(|reference, argument| {
            assert!(matches!(reference, CompletionRef::Prompt { .. }));
            Ok(CompletionResult {
                values: vec![format!("{}-done", argument.value)],
                total: Some(1),
                has_more: Some(false),
            })
        });
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "2",
                "method": "completion/complete",
                "params": {
                    "ref": {"type": "ref/prompt", "name": "p"},
                    "argument": {"name": "a", "value": "x"}
                }
            }))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["result"]["completion"]["values"], json!(["x-done"]));
    }

    #[tokio::test]
    async fn test_cancelled_notification_completes_server_request() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.start().await.unwrap();
        client.handshake().await;
        wait_ready(&server).await;

        let server = Arc::new(server);
        let requester = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .request_sampling(CreateMessageRequest {
                        messages: vec![crate::messages::SamplingMessage::user_text("hi")],
                        model_preferences: None,
                        system_prompt: None,
                        max_tokens: None,
                    })
                    .await
            })
        };

        let request = client.recv().await;
        assert_eq!(request["method"], "sampling/createMessage");
        let id = request["id"].as_str().unwrap().to_string();

        client
            .send(json!({
                "jsonrpc": "2.0",
                "method": "notifications/cancelled",
                "params": {"requestId": id}
            }))
            .await;

        let outcome = requester.await.unwrap();
        assert!(matches!(outcome, Err(McpError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_capabilities_derived_from_registries() {
        let (mut server, mut client) = server_over_duplex(echo_server_config()).await;
        server.register_async_tool(Tool::new("bg"), |_args, _handle| Ok(None));
        server
            .register_resource_template(ResourceTemplate::new("t://{x}"), |uri, _| {
                Ok(vec![ResourceContent::text(uri, "")])
            })
            .unwrap();
        server.register_prompt(Prompt::new("p"), |_args| {
            Ok(GetPromptResponse {
                description: None,
                messages: vec![],
            })
        });
        server.set_completion_handler(|_r, _a| {
            Ok(CompletionResult {
                values: vec![],
                total: None,
                has_more: None,
            })
        });
        server.start().await.unwrap();

        client
            .send(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-11-25",
                    "capabilities": {},
                    "clientInfo": {"name": "c", "version": "0"}
                }
            }))
            .await;
        let reply = client.recv().await;
        let capabilities = &reply["result"]["capabilities"];
        assert_eq!(capabilities["tools"], json!({"listChanged": true}));
        assert_eq!(
            capabilities["resources"],
            json!({"subscribe": true, "listChanged": true})
        );
        assert_eq!(capabilities["prompts"], json!({"listChanged": true}));
        assert_eq!(capabilities["tasks"], json!({}));
        assert_eq!(capabilities["completions"], json!({}));
    }
}
