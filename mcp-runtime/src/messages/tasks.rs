//! Task message types for asynchronous tool invocations.
//!
//! A `tools/call` on an asynchronously-registered tool returns immediately
//! with a [`Task`] descriptor in status [`TaskStatus::Working`]; the client
//! then polls `tasks/get` / `tasks/result` or watches
//! `notifications/tasks/status`. Status transitions are monotonic except for
//! the `working ↔ input_required` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The handler is running
    Working,
    /// The handler is waiting for further input
    InputRequired,
    /// The handler finished and a result is stored
    Completed,
    /// The handler failed
    Failed,
    /// The task was cancelled
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Terminal states admit nothing; `working` and `input_required` may
    /// oscillate; every non-terminal state may move to a terminal one.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (TaskStatus::Working, TaskStatus::InputRequired) => true,
            (TaskStatus::InputRequired, TaskStatus::Working) => true,
            (_, TaskStatus::Working) | (_, TaskStatus::InputRequired) => false,
            (_, next) => next.is_terminal(),
        }
    }
}

/// Task descriptor, as carried in `tools/call` results, `tasks/get`, and
/// `notifications/tasks/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned task identifier
    #[serde(rename = "taskId")]
    pub task_id: String,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Name of the tool the task is running
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Failure message, present when status is `failed`
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    /// When the task was created
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Parameters of `tasks/get`, `tasks/result`, and `tasks/cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIdParams {
    /// Identifier of the task being addressed
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Result payload of `tasks/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTasksResponse {
    /// All tasks currently tracked by the server
    pub tasks: Vec<Task>,
}

/// Parameters of `notifications/tasks/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusParams {
    /// The task whose status changed
    pub task: Task,
}
