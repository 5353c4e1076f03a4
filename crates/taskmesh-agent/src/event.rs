use serde::Serialize;
use std::sync::Arc;
use taskmesh_core::{Message, TaskResult};

/// Severity of an [`AgentEvent::Log`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// A failure.
    Error,
}

/// Everything an agent reports to the outside world.
///
/// The agent never talks to the broker itself; whoever owns it listens for
/// these events and forwards `MessageSent` messages.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// `initialize` completed.
    Initialized {
        /// The agent's id.
        agent_id: String,
    },
    /// `terminate` completed. No further events follow.
    Terminated {
        /// The agent's id.
        agent_id: String,
    },
    /// An outbound message to be routed.
    MessageSent(Message),
    /// An execution finished, successfully or not.
    TaskCompleted(TaskResult),
    /// A log record from the agent.
    Log {
        /// The agent's id.
        agent_id: String,
        /// Severity.
        level: LogLevel,
        /// Text.
        message: String,
    },
}

/// Callback attached to an agent with [`Agent::on_event`](crate::Agent::on_event).
pub type EventListener = Arc<dyn Fn(&AgentEvent) + Send + Sync>;
