use crate::task::TaskStatus;
use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`TaskmeshError`].
pub type TaskmeshResult<T> = Result<T, TaskmeshError>;

/// Top-level error type for the taskmesh runtime.
///
/// Caller errors (unknown ids, bad priorities, over-capacity execution) are
/// reported through dedicated variants so the HTTP layer can map them to
/// status codes without string matching.
#[derive(Error, Debug)]
pub enum TaskmeshError {
    /// A generic failure inside an agent or the runtime around it.
    #[error("Agent error: {0}")]
    Agent(String),

    /// No agent is registered under the given id.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// An agent with the given id is already registered.
    #[error("Agent with id {0} already exists")]
    AgentExists(String),

    /// `execute` was called while the agent already runs its maximum number of tasks.
    #[error("Agent {agent_id} is at maximum concurrent task capacity ({max})")]
    AtCapacity {
        /// The agent that rejected the task.
        agent_id: String,
        /// Its configured concurrency limit.
        max: usize,
    },

    /// No worker factory is registered for the requested agent type.
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    /// No task exists with the given id.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// A task with the given id was already added.
    #[error("Task already exists: {0}")]
    DuplicateTask(Uuid),

    /// Priority outside the accepted `1..=10` range.
    #[error("Invalid priority: {0}. Must be between 1 and 10.")]
    InvalidPriority(u8),

    /// A status change that the task state machine forbids.
    #[error("Invalid task status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status of the task.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// A message payload did not match the shape its kind requires.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A message handler failed while processing a delivery.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The runtime no longer accepts new work.
    #[error("Runtime is shutting down")]
    ShuttingDown,

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_names_agent() {
        let err = TaskmeshError::AtCapacity {
            agent_id: "worker-1".into(),
            max: 2,
        };
        assert_eq!(
            err.to_string(),
            "Agent worker-1 is at maximum concurrent task capacity (2)"
        );
    }

    #[test]
    fn test_transition_message() {
        let err = TaskmeshError::InvalidTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "Invalid task status transition from completed to in_progress"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: TaskmeshError = parse.unwrap_err().into();
        assert!(matches!(err, TaskmeshError::Json(_)));
    }
}
