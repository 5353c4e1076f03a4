use crate::task_manager::{TaskEvent, TaskManager, TaskMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, OnceLock, Weak};
use taskmesh_agent::{Agent, AgentBehavior, LogLevel};
use taskmesh_core::protocol::{
    Acknowledgement, AgentDeregistration, AgentRegistration, ExecutionRejected, WorkerRequest,
};
use taskmesh_core::{
    AgentConfig, AgentStatus, Message, MessageKind, NewTask, Task, TaskResult, TaskmeshError,
    TaskmeshResult,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mailbox id of the coordinator.
pub const COORDINATOR_ID: &str = "coordinator-001";

/// Capabilities the coordinator declares.
pub const COORDINATOR_CAPABILITIES: [&str; 3] =
    ["task-coordination", "agent-discovery", "load-balancing"];

/// The coordinator's view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Worker id.
    pub agent_id: String,
    /// Task types it accepts.
    pub capabilities: Vec<String>,
    /// Tasks assigned and not yet reported back.
    pub load: usize,
    /// Declared concurrency limit, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

impl RegistryEntry {
    fn accepts(&self, task: &Task) -> bool {
        task.matches(&self.capabilities) && self.capacity.is_none_or(|max| self.load < max)
    }
}

/// Identity block of [`SystemStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorInfo {
    /// Coordinator id.
    pub id: String,
    /// Coordinator agent status.
    pub status: AgentStatus,
}

/// Snapshot of the registry and task metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// The coordinator itself.
    pub coordinator: CoordinatorInfo,
    /// Registered workers in registration order.
    pub agents: Vec<RegistryEntry>,
    /// Task counts.
    pub tasks: TaskMetrics,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Assigns tasks to the least-loaded capable worker.
///
/// The registry is a cache of assignment counts, not a source of truth for
/// task state. Entries keep their registration order so ties go to the
/// earliest registered worker.
pub struct Coordinator {
    tasks: Arc<TaskManager>,
    registry: Mutex<Vec<RegistryEntry>>,
    agent: OnceLock<Weak<Agent>>,
}

impl Coordinator {
    /// Build the coordinator agent over a task manager.
    ///
    /// Handlers and the task-added subscription are installed when the
    /// returned agent is initialized.
    pub fn create(tasks: Arc<TaskManager>) -> (Arc<Agent>, Arc<Coordinator>) {
        let coordinator = Arc::new(Coordinator {
            tasks,
            registry: Mutex::new(Vec::new()),
            agent: OnceLock::new(),
        });
        let config = AgentConfig::new(
            COORDINATOR_ID,
            "Task Coordinator",
            "coordinator",
            COORDINATOR_CAPABILITIES.iter().map(|c| (*c).to_string()).collect(),
        );
        let agent = Agent::new(config, CoordinatorBehavior(Arc::clone(&coordinator)));
        (agent, coordinator)
    }

    fn agent(&self) -> Option<Arc<Agent>> {
        self.agent.get().and_then(Weak::upgrade)
    }

    /// Registry snapshot in registration order.
    pub fn registry(&self) -> Vec<RegistryEntry> {
        self.registry.lock().clone()
    }

    /// Current load of one worker.
    pub fn agent_load(&self, agent_id: &str) -> Option<usize> {
        self.registry
            .lock()
            .iter()
            .find(|e| e.agent_id == agent_id)
            .map(|e| e.load)
    }

    /// The underlying task manager.
    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Insert or overwrite a registry entry with load 0.
    pub fn register_agent(&self, registration: AgentRegistration) {
        let mut registry = self.registry.lock();
        let entry = RegistryEntry {
            agent_id: registration.agent_id,
            capabilities: registration.capabilities,
            load: 0,
            capacity: registration.max_concurrent_tasks,
        };
        match registry.iter_mut().find(|e| e.agent_id == entry.agent_id) {
            Some(existing) => *existing = entry,
            None => registry.push(entry),
        }
    }

    /// Drop a registry entry. Tasks it holds are not reassigned.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|e| e.agent_id != agent_id);
        registry.len() != before
    }

    fn release_load(&self, agent_id: &str) {
        if let Some(entry) = self
            .registry
            .lock()
            .iter_mut()
            .find(|e| e.agent_id == agent_id)
        {
            entry.load = entry.load.saturating_sub(1);
        }
    }

    /// Try to assign one waiting task now.
    ///
    /// Returns `false` and leaves the task pending when it is not waiting,
    /// its dependencies are not complete, or no registered worker can take
    /// it. There is no retry timer; a later registration or result rescans.
    pub fn attempt_task_distribution(&self, task_id: Uuid) -> bool {
        let Some(task) = self.tasks.get_task(task_id) else {
            return false;
        };
        if !task.status.is_waiting() {
            return false;
        }
        if !self.tasks.dependencies_satisfied(task_id) {
            debug!(task_id = %task_id, "Task waiting on dependencies");
            return false;
        }
        self.distribute(&task)
    }

    fn distribute(&self, task: &Task) -> bool {
        let Some(agent) = self.agent() else {
            return false;
        };

        let chosen = {
            let mut registry = self.registry.lock();
            let mut best: Option<usize> = None;
            for (idx, entry) in registry.iter().enumerate() {
                if entry.accepts(task) && best.is_none_or(|b| entry.load < registry[b].load) {
                    best = Some(idx);
                }
            }
            best.map(|idx| {
                registry[idx].load += 1;
                registry[idx].agent_id.clone()
            })
        };

        let Some(agent_id) = chosen else {
            warn!(task_id = %task.id, task_type = %task.task_type, "No suitable agent found for task");
            agent.log(
                LogLevel::Warn,
                format!("No suitable agent found for task: {}", task.id),
            );
            return false;
        };

        let assigned = match self.tasks.assign_task(task.id, &agent_id) {
            Ok(assigned) => assigned,
            Err(e) => {
                warn!(task_id = %task.id, agent_id = %agent_id, error = %e, "Task assignment failed");
                self.release_load(&agent_id);
                return false;
            }
        };

        match serde_json::to_value(WorkerRequest::ExecuteTask { task: assigned }) {
            Ok(payload) => {
                agent.send_message(&agent_id, MessageKind::Request, payload);
                info!(task_id = %task.id, agent_id = %agent_id, "Task dispatched");
                true
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Could not encode execute request");
                self.release_load(&agent_id);
                if let Err(e) = self.tasks.requeue(task.id) {
                    warn!(task_id = %task.id, error = %e, "Could not return task to its lane");
                }
                false
            }
        }
    }

    /// Hand out every eligible task the given capabilities can take.
    fn drain(&self, capabilities: &[String]) -> usize {
        let mut assigned = 0;
        while let Some(task) = self.tasks.get_next_task(capabilities) {
            if self.distribute(&task) {
                assigned += 1;
            } else {
                if let Err(e) = self.tasks.requeue(task.id) {
                    warn!(task_id = %task.id, error = %e, "Could not return task to its lane");
                }
                break;
            }
        }
        assigned
    }

    /// Rescan pending work for every registered worker.
    pub fn drain_all(&self) -> usize {
        let capability_sets: Vec<Vec<String>> = self
            .registry
            .lock()
            .iter()
            .map(|e| e.capabilities.clone())
            .collect();
        capability_sets.iter().map(|caps| self.drain(caps)).sum()
    }

    /// Apply a worker's execution result.
    pub fn apply_result(&self, result: &TaskResult) {
        let outcome = self.tasks.update_task_status(
            result.task_id,
            result.status(),
            result.data.clone(),
            result.error.clone(),
        );
        if let Err(e) = outcome {
            warn!(task_id = %result.task_id, error = %e, "Could not record task result");
        }
        self.release_load(&result.agent_id);
        info!(
            task_id = %result.task_id,
            agent_id = %result.agent_id,
            success = result.success,
            execution_ms = result.execution_time_ms,
            "Task result received"
        );
    }

    /// Registry and task metrics snapshot.
    pub fn get_system_status(&self) -> SystemStatus {
        let status = self.agent().map_or(AgentStatus::Offline, |a| a.status());
        SystemStatus {
            coordinator: CoordinatorInfo {
                id: COORDINATOR_ID.to_string(),
                status,
            },
            agents: self.registry(),
            tasks: self.tasks.get_metrics(),
            timestamp: Utc::now(),
        }
    }

    fn install_handlers(self: &Arc<Self>, agent: &Arc<Agent>) {
        let this = Arc::clone(self);
        agent.register_handler(MessageKind::AgentRegister, move |agent, message| {
            let this = Arc::clone(&this);
            async move {
                let registration: AgentRegistration = match message.parse_payload() {
                    Ok(r) => r,
                    Err(e) => return reject(&agent, &message, e),
                };
                let capabilities = registration.capabilities.clone();
                info!(agent_id = %registration.agent_id, capabilities = ?capabilities, "Agent registered");
                this.register_agent(registration);
                acknowledge(&agent, &message, Acknowledgement::ok("Agent registered successfully"))?;
                this.drain(&capabilities);
                Ok(())
            }
        });

        let this = Arc::clone(self);
        agent.register_handler(MessageKind::AgentUnregister, move |agent, message| {
            let this = Arc::clone(&this);
            async move {
                let deregistration: AgentDeregistration = match message.parse_payload() {
                    Ok(d) => d,
                    Err(e) => return reject(&agent, &message, e),
                };
                this.unregister_agent(&deregistration.agent_id);
                info!(agent_id = %deregistration.agent_id, "Agent unregistered");
                acknowledge(&agent, &message, Acknowledgement::ok("Agent unregistered successfully"))
            }
        });

        let this = Arc::clone(self);
        agent.register_handler(MessageKind::TaskRequest, move |agent, message| {
            let this = Arc::clone(&this);
            async move {
                let created = message
                    .parse_payload::<NewTask>()
                    .and_then(|new_task| this.tasks.create_task(new_task));
                let task = match created {
                    Ok(task) => task,
                    Err(e) => return reject(&agent, &message, e),
                };
                acknowledge(
                    &agent,
                    &message,
                    Acknowledgement::ok("Task queued successfully").with_task_id(task.id),
                )?;
                this.attempt_task_distribution(task.id);
                Ok(())
            }
        });

        let this = Arc::clone(self);
        agent.register_handler(MessageKind::TaskResult, move |_agent, message| {
            let this = Arc::clone(&this);
            async move {
                let result: TaskResult = message.parse_payload()?;
                this.apply_result(&result);
                this.drain_all();
                Ok(())
            }
        });

        let this = Arc::clone(self);
        agent.register_handler(MessageKind::Error, move |_agent, message| {
            let this = Arc::clone(&this);
            async move {
                match message.parse_payload::<ExecutionRejected>() {
                    Ok(rejected) => {
                        warn!(
                            task_id = %rejected.task_id,
                            agent_id = %message.from(),
                            error = %rejected.error,
                            "Worker rejected task, returning it to pending"
                        );
                        this.release_load(message.from());
                        this.tasks.requeue(rejected.task_id)?;
                    }
                    Err(_) => {
                        warn!(from = %message.from(), payload = %message.payload(), "Error message received");
                    }
                }
                Ok(())
            }
        });
    }

    fn subscribe_to_tasks(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.tasks.on_event(move |event| {
            if let TaskEvent::Added(task) = event {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.attempt_task_distribution(task.id);
                }
            }
        });
    }
}

fn acknowledge(agent: &Agent, request: &Message, ack: Acknowledgement) -> TaskmeshResult<()> {
    agent.reply(request, MessageKind::Response, serde_json::to_value(ack)?);
    Ok(())
}

fn reject(agent: &Agent, request: &Message, error: TaskmeshError) -> TaskmeshResult<()> {
    warn!(from = %request.from(), kind = %request.kind(), error = %error, "Rejected coordinator request");
    agent.reply(
        request,
        MessageKind::Error,
        serde_json::to_value(Acknowledgement::rejected(error.to_string()))?,
    );
    Ok(())
}

struct CoordinatorBehavior(Arc<Coordinator>);

#[async_trait]
impl AgentBehavior for CoordinatorBehavior {
    async fn on_initialize(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        let coordinator = &self.0;
        if coordinator.agent.set(Arc::downgrade(agent)).is_err() {
            return Err(TaskmeshError::Agent("coordinator already bound".into()));
        }
        coordinator.install_handlers(agent);
        coordinator.subscribe_to_tasks();
        agent.broadcast(MessageKind::Event, json!({ "type": "coordinator-ready" }));
        Ok(())
    }

    async fn on_terminate(&self, _agent: &Arc<Agent>) -> TaskmeshResult<()> {
        self.0.registry.lock().clear();
        Ok(())
    }

    async fn on_execute(&self, _agent: &Arc<Agent>, task: &Task) -> TaskmeshResult<serde_json::Value> {
        match task.task_type.as_str() {
            "distribute-task" => {
                let task_id = task
                    .payload
                    .get("taskId")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| TaskmeshError::InvalidPayload("distribute-task needs a taskId".into()))?;
                let distributed = self.0.attempt_task_distribution(task_id);
                Ok(json!({ "taskId": task_id, "distributed": distributed }))
            }
            "get-system-status" => Ok(serde_json::to_value(self.0.get_system_status())?),
            other => Err(TaskmeshError::Agent(format!("Unknown task type: {other}"))),
        }
    }

    async fn on_message(&self, agent: &Arc<Agent>, message: Message) -> TaskmeshResult<()> {
        debug!(from = %message.from(), kind = %message.kind(), "Unhandled coordinator message");
        agent.log(LogLevel::Debug, format!("Unhandled message type: {}", message.kind()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use taskmesh_agent::AgentEvent;
    use taskmesh_core::TaskStatus;

    struct Harness {
        agent: Arc<Agent>,
        coordinator: Arc<Coordinator>,
        tasks: Arc<TaskManager>,
        sent: Arc<Mutex<Vec<Message>>>,
    }

    async fn harness() -> Harness {
        let tasks = Arc::new(TaskManager::new());
        let (agent, coordinator) = Coordinator::create(Arc::clone(&tasks));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        agent.on_event(move |e| {
            if let AgentEvent::MessageSent(m) = e {
                sink.lock().push(m.clone());
            }
        });
        agent.initialize().await.unwrap();
        Harness {
            agent,
            coordinator,
            tasks,
            sent,
        }
    }

    fn registration(id: &str, caps: &[&str]) -> Message {
        let payload = serde_json::to_value(AgentRegistration {
            agent_id: id.into(),
            capabilities: caps.iter().map(|c| (*c).to_string()).collect(),
            max_concurrent_tasks: None,
        })
        .unwrap();
        Message::new("agent-manager", COORDINATOR_ID, MessageKind::AgentRegister, payload)
    }

    fn requests_to(sent: &Mutex<Vec<Message>>, agent_id: &str) -> Vec<Task> {
        sent.lock()
            .iter()
            .filter(|m| m.to() == agent_id && m.kind() == &MessageKind::Request)
            .map(|m| {
                let WorkerRequest::ExecuteTask { task } = m.parse_payload::<WorkerRequest>().unwrap();
                task
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ready_broadcast_on_initialize() {
        let h = harness().await;
        let sent = h.sent.lock();
        assert!(sent[0].is_broadcast());
        assert_eq!(sent[0].payload()["type"], "coordinator-ready");
    }

    #[tokio::test]
    async fn test_register_acknowledges_and_drains() {
        let h = harness().await;
        let t1 = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        let t2 = h.tasks.create_task(NewTask::new("x", 7)).unwrap();

        let reg = registration("worker-a", &["x"]);
        h.agent.receive_message(reg.clone()).await.unwrap();

        let ack = h
            .sent
            .lock()
            .iter()
            .find(|m| m.correlation_id() == Some(reg.id()))
            .cloned()
            .unwrap();
        assert_eq!(ack.payload()["success"], true);

        let dispatched: Vec<Uuid> = requests_to(&h.sent, "worker-a").iter().map(|t| t.id).collect();
        assert_eq!(dispatched, vec![t2.id, t1.id]);
        assert_eq!(h.coordinator.agent_load("worker-a"), Some(2));
    }

    #[tokio::test]
    async fn test_least_loaded_with_first_registered_tie_break() {
        let h = harness().await;
        h.agent.receive_message(registration("a", &["x"])).await.unwrap();
        h.agent.receive_message(registration("b", &["x"])).await.unwrap();

        let first = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        assert_eq!(h.tasks.get_task(first.id).unwrap().assigned_agent.as_deref(), Some("a"));
        let second = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        assert_eq!(h.tasks.get_task(second.id).unwrap().assigned_agent.as_deref(), Some("b"));
        let third = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        assert_eq!(h.tasks.get_task(third.id).unwrap().assigned_agent.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_task_request_creates_once_and_acks_with_id() {
        let h = harness().await;
        h.agent.receive_message(registration("a", &["x"])).await.unwrap();

        let request = Message::new(
            "client",
            COORDINATOR_ID,
            MessageKind::TaskRequest,
            json!({"type": "x", "priority": 5, "payload": {}}),
        );
        h.agent.receive_message(request.clone()).await.unwrap();

        let ack = h
            .sent
            .lock()
            .iter()
            .find(|m| m.correlation_id() == Some(request.id()))
            .cloned()
            .unwrap();
        let task_id: Uuid = serde_json::from_value(ack.payload()["taskId"].clone()).unwrap();
        assert_eq!(h.tasks.get_task(task_id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(requests_to(&h.sent, "a").len(), 1);
        assert_eq!(h.coordinator.agent_load("a"), Some(1));
    }

    #[tokio::test]
    async fn test_invalid_task_request_gets_error_reply() {
        let h = harness().await;
        let request = Message::new(
            "client",
            COORDINATOR_ID,
            MessageKind::TaskRequest,
            json!({"type": "x", "priority": 42}),
        );
        h.agent.receive_message(request.clone()).await.unwrap();
        let reply = h
            .sent
            .lock()
            .iter()
            .find(|m| m.correlation_id() == Some(request.id()))
            .cloned()
            .unwrap();
        assert_eq!(reply.kind(), &MessageKind::Error);
        assert_eq!(reply.payload()["success"], false);
        assert_eq!(h.tasks.get_metrics().total, 0);
    }

    #[tokio::test]
    async fn test_result_releases_load_and_rescans() {
        let h = harness().await;
        h.agent.receive_message(registration("a", &["x"])).await.unwrap();
        let a = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        let b = h
            .tasks
            .create_task(NewTask::new("x", 5).with_dependencies(vec![a.id]))
            .unwrap();
        assert_eq!(h.tasks.get_task(b.id).unwrap().status, TaskStatus::Pending);

        let result = TaskResult::success(a.id, "a", json!({"done": true}), 5);
        h.agent
            .receive_message(Message::new(
                "a",
                COORDINATOR_ID,
                MessageKind::TaskResult,
                serde_json::to_value(&result).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(h.tasks.get_task(a.id).unwrap().status, TaskStatus::Completed);
        assert_eq!(h.tasks.get_task(b.id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(h.coordinator.agent_load("a"), Some(1));
    }

    #[tokio::test]
    async fn test_capacity_limits_selection() {
        let h = harness().await;
        let payload = serde_json::to_value(AgentRegistration {
            agent_id: "small".into(),
            capabilities: vec!["x".into()],
            max_concurrent_tasks: Some(1),
        })
        .unwrap();
        h.agent
            .receive_message(Message::new("m", COORDINATOR_ID, MessageKind::AgentRegister, payload))
            .await
            .unwrap();

        let first = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        let second = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        assert_eq!(h.tasks.get_task(first.id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(h.tasks.get_task(second.id).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_refused_task_keeps_lane_order_behind_older_blocked_task() {
        let h = harness().await;
        let dep = h.tasks.create_task(NewTask::new("z", 5)).unwrap();
        let t1 = h
            .tasks
            .create_task(NewTask::new("x", 5).with_dependencies(vec![dep.id]))
            .unwrap();
        let t2 = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        let t3 = h.tasks.create_task(NewTask::new("x", 5)).unwrap();

        let payload = serde_json::to_value(AgentRegistration {
            agent_id: "small".into(),
            capabilities: vec!["x".into()],
            max_concurrent_tasks: Some(1),
        })
        .unwrap();
        h.agent
            .receive_message(Message::new("m", COORDINATOR_ID, MessageKind::AgentRegister, payload))
            .await
            .unwrap();
        assert_eq!(h.tasks.get_task(t2.id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(h.tasks.get_task(t3.id).unwrap().status, TaskStatus::Pending);

        h.tasks.assign_task(dep.id, "elsewhere").unwrap();
        h.tasks
            .update_task_status(dep.id, TaskStatus::Completed, None, None)
            .unwrap();

        let result = TaskResult::success(t2.id, "small", json!({}), 1);
        h.agent
            .receive_message(Message::new(
                "small",
                COORDINATOR_ID,
                MessageKind::TaskResult,
                serde_json::to_value(&result).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(h.tasks.get_task(t1.id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(h.tasks.get_task(t3.id).unwrap().status, TaskStatus::Pending);
        assert_eq!(h.coordinator.agent_load("small"), Some(1));
    }

    #[tokio::test]
    async fn test_rejection_requeues_and_releases() {
        let h = harness().await;
        h.agent.receive_message(registration("a", &["x"])).await.unwrap();
        let task = h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        assert_eq!(h.coordinator.agent_load("a"), Some(1));

        let rejected = ExecutionRejected {
            task_id: task.id,
            error: "at capacity".into(),
        };
        h.agent
            .receive_message(Message::new(
                "a",
                COORDINATOR_ID,
                MessageKind::Error,
                serde_json::to_value(&rejected).unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(h.coordinator.agent_load("a"), Some(0));
        let task = h.tasks.get_task(task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_agent.is_none());
    }

    #[tokio::test]
    async fn test_unregister_leaves_tasks_in_progress() {
        let h = harness().await;
        h.agent.receive_message(registration("a", &["x"])).await.unwrap();
        let task = h.tasks.create_task(NewTask::new("x", 5)).unwrap();

        let payload = serde_json::to_value(AgentDeregistration { agent_id: "a".into() }).unwrap();
        h.agent
            .receive_message(Message::new("m", COORDINATOR_ID, MessageKind::AgentUnregister, payload))
            .await
            .unwrap();

        assert!(h.coordinator.registry().is_empty());
        assert_eq!(h.tasks.get_task(task.id).unwrap().status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_execute_own_task_types() {
        let h = harness().await;
        let status = h
            .agent
            .execute(Task::new("get-system-status", 5))
            .await
            .unwrap();
        assert!(status.success);
        assert_eq!(status.data.unwrap()["coordinator"]["id"], COORDINATOR_ID);

        let unknown = h.agent.execute(Task::new("bake-bread", 5)).await.unwrap();
        assert!(!unknown.success);
    }

    #[tokio::test]
    async fn test_reregister_resets_load_in_place() {
        let h = harness().await;
        h.agent.receive_message(registration("a", &["x"])).await.unwrap();
        h.agent.receive_message(registration("b", &["x"])).await.unwrap();
        h.tasks.create_task(NewTask::new("x", 5)).unwrap();
        assert_eq!(h.coordinator.agent_load("a"), Some(1));

        h.agent.receive_message(registration("a", &["x", "y"])).await.unwrap();
        let registry = h.coordinator.registry();
        assert_eq!(registry[0].agent_id, "a");
        assert_eq!(registry[0].load, 0);
        assert_eq!(registry[0].capabilities, vec!["x", "y"]);
    }
}
