use crate::agent::Agent;
use crate::behavior::AgentBehavior;
use std::sync::Arc;
use taskmesh_core::protocol::{ExecutionRejected, WorkerRequest};
use taskmesh_core::{AgentConfig, Message, MessageKind, TaskmeshError};
use tracing::{debug, warn};

/// Build an agent that accepts `execute-task` requests.
///
/// A `request` whose payload is a [`WorkerRequest::ExecuteTask`] starts the
/// execution in the background and returns as soon as the request is
/// accepted; the result surfaces as a `TaskCompleted` event. If the agent
/// turns the task away (capacity, not running) the requester gets an
/// `error` reply carrying [`ExecutionRejected`]. Any other `request` goes
/// to the behavior's fallback handler.
pub fn worker_agent(config: AgentConfig, behavior: impl AgentBehavior + 'static) -> Arc<Agent> {
    let agent = Agent::new(config, behavior);
    agent.register_handler(MessageKind::Request, |agent, message| async move {
        match message.parse_payload::<WorkerRequest>() {
            Ok(WorkerRequest::ExecuteTask { task }) => {
                debug!(agent_id = %agent.id(), task_id = %task.id, "Execute request accepted");
                tokio::spawn(run_requested(agent, message, task));
                Ok(())
            }
            Err(_) => agent.fallback(message).await,
        }
    });
    agent
}

async fn run_requested(agent: Arc<Agent>, request: Message, task: taskmesh_core::Task) {
    let task_id = task.id;
    if let Err(e) = agent.execute(task).await {
        warn!(agent_id = %agent.id(), task_id = %task_id, error = %e, "Execute request rejected");
        let rejection = ExecutionRejected {
            task_id,
            error: e.to_string(),
        };
        match serde_json::to_value(&rejection) {
            Ok(payload) => {
                agent.reply(&request, MessageKind::Error, payload);
            }
            Err(e) => warn!(error = %TaskmeshError::from(e), "Could not encode rejection"),
        }
    }
}
