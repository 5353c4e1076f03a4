//! Regression tests for taskmesh-agent: lifecycle events, default handlers, worker requests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use taskmesh_agent::{worker_agent, Agent, AgentBehavior, AgentEvent, Lifecycle, LogLevel};
use taskmesh_core::protocol::WorkerRequest;
use taskmesh_core::{AgentConfig, AgentStatus, Message, MessageKind, Task, TaskmeshResult};

struct Upper;

#[async_trait]
impl AgentBehavior for Upper {
    async fn on_initialize(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        agent.log(LogLevel::Debug, "upper ready");
        Ok(())
    }

    async fn on_terminate(&self, _agent: &Arc<Agent>) -> TaskmeshResult<()> {
        Ok(())
    }

    async fn on_execute(&self, _agent: &Arc<Agent>, task: &Task) -> TaskmeshResult<serde_json::Value> {
        let text = task.payload["text"].as_str().unwrap_or_default();
        Ok(json!({ "upper": text.to_uppercase() }))
    }

    async fn on_message(&self, _agent: &Arc<Agent>, _message: Message) -> TaskmeshResult<()> {
        Ok(())
    }
}

fn config() -> AgentConfig {
    AgentConfig::new("upper-1", "Upper", "upper", vec!["uppercase".into()])
}

fn recorder(agent: &Agent) -> Arc<Mutex<Vec<AgentEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    agent.on_event(move |e| sink.lock().push(e.clone()));
    events
}

fn sent(events: &Mutex<Vec<AgentEvent>>) -> Vec<Message> {
    events
        .lock()
        .iter()
        .filter_map(|e| match e {
            AgentEvent::MessageSent(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_events_in_order() {
    let agent = Agent::new(config(), Upper);
    let events = recorder(&agent);
    assert_eq!(agent.lifecycle(), Lifecycle::Created);

    agent.initialize().await.unwrap();
    assert_eq!(agent.lifecycle(), Lifecycle::Running);
    agent.terminate().await.unwrap();
    assert_eq!(agent.lifecycle(), Lifecycle::Terminated);

    let kinds: Vec<&'static str> = events
        .lock()
        .iter()
        .map(|e| match e {
            AgentEvent::Initialized { .. } => "initialized",
            AgentEvent::Terminated { .. } => "terminated",
            AgentEvent::Log { .. } => "log",
            AgentEvent::MessageSent(_) => "sent",
            AgentEvent::TaskCompleted(_) => "completed",
        })
        .filter(|k| *k != "log")
        .collect();
    assert_eq!(kinds, vec!["initialized", "terminated"]);
}

#[tokio::test]
async fn execution_result_carries_agent_and_timing() {
    let agent = Agent::new(config(), Upper);
    agent.initialize().await.unwrap();
    let task = Task::new("uppercase", 3).with_payload(json!({"text": "abc"}));

    let result = agent.execute(task.clone()).await.unwrap();
    assert_eq!(result.task_id, task.id);
    assert_eq!(result.agent_id, "upper-1");
    assert_eq!(result.data, Some(json!({"upper": "ABC"})));
    assert_eq!(agent.status(), AgentStatus::Idle);
    assert!(agent.state().current_tasks.is_empty());
}

// ---------------------------------------------------------------------------
// Default handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_handler_reports_state_and_config() {
    let agent = Agent::new(config(), Upper);
    let events = recorder(&agent);
    agent.initialize().await.unwrap();

    let request = Message::new("monitor", "upper-1", MessageKind::Status, json!({}));
    agent.receive_message(request.clone()).await.unwrap();

    let replies = sent(&events);
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.kind(), &MessageKind::Response);
    assert_eq!(reply.correlation_id(), Some(request.id()));
    assert_eq!(reply.payload()["state"]["status"], "idle");
    assert_eq!(reply.payload()["config"]["id"], "upper-1");
    assert_eq!(reply.payload()["config"]["capabilities"], json!(["uppercase"]));
}

#[tokio::test]
async fn broadcast_uses_sentinel() {
    let agent = Agent::new(config(), Upper);
    let events = recorder(&agent);
    let msg = agent.broadcast(MessageKind::Event, json!({"hello": true}));
    assert!(msg.is_broadcast());
    assert_eq!(sent(&events)[0].id(), msg.id());
}

// ---------------------------------------------------------------------------
// Worker requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_executes_requested_task() {
    let agent = worker_agent(config(), Upper);
    let events = recorder(&agent);
    agent.initialize().await.unwrap();

    let task = Task::new("uppercase", 5).with_payload(json!({"text": "hi"}));
    let payload = serde_json::to_value(WorkerRequest::ExecuteTask { task: task.clone() }).unwrap();
    agent
        .receive_message(Message::new("coordinator-001", "upper-1", MessageKind::Request, payload))
        .await
        .unwrap();

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let result = events
        .lock()
        .iter()
        .find_map(|e| match e {
            AgentEvent::TaskCompleted(r) => Some(r.clone()),
            _ => None,
        })
        .expect("task completed");
    assert_eq!(result.task_id, task.id);
    assert_eq!(result.data, Some(json!({"upper": "HI"})));
}
