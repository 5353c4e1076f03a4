use crate::agent::Agent;
use async_trait::async_trait;
use std::sync::Arc;
use taskmesh_core::{Message, Task, TaskmeshResult};

/// The agent-specific half of an [`Agent`].
///
/// The [`Agent`] runtime owns lifecycle, capacity and dispatch; a behavior
/// supplies setup, teardown, the execution routine and the fallback for
/// message types with no registered handler.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Runs once inside `initialize`, after the agent is marked idle.
    /// Handlers registered here are active before the agent receives anything.
    async fn on_initialize(&self, agent: &Arc<Agent>) -> TaskmeshResult<()>;

    /// Runs once inside `terminate`, after the agent is marked offline.
    async fn on_terminate(&self, agent: &Arc<Agent>) -> TaskmeshResult<()>;

    /// Execute a task. An `Err` becomes a failed `TaskResult`.
    async fn on_execute(&self, agent: &Arc<Agent>, task: &Task) -> TaskmeshResult<serde_json::Value>;

    /// Handle a message whose type has no registered handler.
    async fn on_message(&self, agent: &Arc<Agent>, message: Message) -> TaskmeshResult<()>;
}
