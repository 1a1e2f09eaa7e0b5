//! Task registry: state and transitions for asynchronous tool invocations.
//!
//! Pure bookkeeping: notification emission is wired up by the server role,
//! which owns the transport. Task ids come from a per-server monotonic
//! counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{McpError, McpResult, ProtocolError};
use crate::messages::{CallToolResponse, Task, TaskStatus};

struct TaskEntry {
    task: Task,
    result: Option<CallToolResponse>,
}

/// Registry of all tasks created by one server.
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    counter: AtomicU64,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create a new task in `working` state for the given tool.
    pub(crate) fn create(&self, tool_name: &str) -> Task {
        let task_id = self.counter.fetch_add(1, Ordering::SeqCst).to_string();
        let task = Task {
            task_id: task_id.clone(),
            status: TaskStatus::Working,
            tool_name: Some(tool_name.to_string()),
            status_message: None,
            created_at: Some(chrono::Utc::now()),
        };
        self.tasks.lock().expect("task registry lock").insert(
            task_id,
            TaskEntry {
                task: task.clone(),
                result: None,
            },
        );
        task
    }

    /// Fetch a task descriptor.
    pub(crate) fn get(&self, task_id: &str) -> McpResult<Task> {
        self.tasks
            .lock()
            .expect("task registry lock")
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| unknown_task(task_id))
    }

    /// All tracked tasks, ordered by task id.
    pub(crate) fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .expect("task registry lock")
            .values()
            .map(|entry| entry.task.clone())
            .collect();
        tasks.sort_by(|a, b| {
            let a = a.task_id.parse::<u64>().unwrap_or(u64::MAX);
            let b = b.task_id.parse::<u64>().unwrap_or(u64::MAX);
            a.cmp(&b)
        });
        tasks
    }

    /// Move a task to `status`, enforcing the transition rules, optionally
    /// recording a status message and a stored result. Returns the updated
    /// descriptor for the status notification.
    pub(crate) fn transition(
        &self,
        task_id: &str,
        status: TaskStatus,
        status_message: Option<String>,
        result: Option<CallToolResponse>,
    ) -> McpResult<Task> {
        let mut tasks = self.tasks.lock().expect("task registry lock");
        let entry = tasks.get_mut(task_id).ok_or_else(|| unknown_task(task_id))?;

        if !entry.task.status.can_transition_to(status) {
            return Err(ProtocolError::StateViolation {
                from: format!("task {}", serde_plain(entry.task.status)),
                to: format!("task {}", serde_plain(status)),
            }
            .into());
        }

        entry.task.status = status;
        entry.task.status_message = status_message;
        if result.is_some() {
            entry.result = result;
        }
        tracing::debug!(task_id, status = serde_plain(status), "task transitioned");
        Ok(entry.task.clone())
    }

    /// The stored result of a terminal task.
    ///
    /// Non-terminal tasks produce the "Task not yet completed" invalid-params
    /// error; failed and cancelled tasks report their outcome as an error.
    pub(crate) fn result(&self, task_id: &str) -> McpResult<CallToolResponse> {
        let tasks = self.tasks.lock().expect("task registry lock");
        let entry = tasks.get(task_id).ok_or_else(|| unknown_task(task_id))?;

        match entry.task.status {
            TaskStatus::Working | TaskStatus::InputRequired => {
                Err(ProtocolError::InvalidParams {
                    reason: "Task not yet completed".to_string(),
                }
                .into())
            }
            TaskStatus::Completed => Ok(entry.result.clone().unwrap_or(CallToolResponse {
                content: Vec::new(),
                is_error: Some(false),
                task: None,
            })),
            TaskStatus::Failed => Err(McpError::internal(format!(
                "Task failed: {}",
                entry
                    .task
                    .status_message
                    .as_deref()
                    .unwrap_or("no failure message")
            ))),
            TaskStatus::Cancelled => Err(McpError::cancelled("Task was cancelled")),
        }
    }
}

fn unknown_task(task_id: &str) -> McpError {
    ProtocolError::InvalidParams {
        reason: format!("Unknown task: {task_id}"),
    }
    .into()
}

fn serde_plain(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Working => "working",
        TaskStatus::InputRequired => "input_required",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}
