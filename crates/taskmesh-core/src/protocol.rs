//! Typed payloads for the coordination protocol between the coordinator,
//! the agent manager and workers.

use crate::task::Task;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of an `agent-register` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    /// The agent being announced.
    pub agent_id: String,
    /// Task types it can execute.
    pub capabilities: Vec<String>,
    /// Declared concurrency limit; absent means unbounded for selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
}

/// Payload of an `agent-unregister` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDeregistration {
    /// The agent leaving.
    pub agent_id: String,
}

/// Payload of a `request` message sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerRequest {
    /// Run the given task.
    ExecuteTask {
        /// Snapshot of the task as assigned.
        task: Task,
    },
}

/// Payload of a `response` acknowledging a protocol request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    /// Whether the request was accepted.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Id of a created task, for `task-request`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
}

impl Acknowledgement {
    /// An accepted request.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            task_id: None,
        }
    }

    /// A rejected request.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            task_id: None,
        }
    }

    /// Attach the id of a created task.
    pub fn with_task_id(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Payload of an `error` reply from a worker that could not accept a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRejected {
    /// The task that was turned away.
    pub task_id: Uuid,
    /// Why.
    pub error: String,
}
