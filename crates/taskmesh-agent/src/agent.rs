use crate::behavior::AgentBehavior;
use crate::event::{AgentEvent, EventListener, LogLevel};
use chrono::Utc;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use taskmesh_core::{
    AgentConfig, AgentState, AgentStatus, Message, MessageKind, Task, TaskResult, TaskmeshError,
    TaskmeshResult,
};
use tracing::{debug, info, warn};

/// A registered per-type message handler.
pub type MessageHandlerFn =
    Arc<dyn Fn(Arc<Agent>, Message) -> BoxFuture<'static, TaskmeshResult<()>> + Send + Sync>;

/// Where an agent is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, not yet initialized.
    Created,
    /// Initialized and accepting work.
    Running,
    /// Terminated; never runs again.
    Terminated,
}

struct Shared {
    state: AgentState,
    lifecycle: Lifecycle,
}

/// An independently lifecycled worker with bounded concurrent execution.
///
/// Outbound traffic (`send_message`, `reply`) and results are emitted as
/// [`AgentEvent`]s; wiring them into a broker is the owner's job.
///
/// `timeout_ms` from the config is carried for introspection only. No
/// watchdog cancels a long-running execution.
pub struct Agent {
    config: AgentConfig,
    shared: Mutex<Shared>,
    handlers: RwLock<HashMap<MessageKind, MessageHandlerFn>>,
    listeners: RwLock<Vec<EventListener>>,
    behavior: Arc<dyn AgentBehavior>,
}

impl Agent {
    /// Build an agent with the default `ping` and `status` handlers installed.
    pub fn new(config: AgentConfig, behavior: impl AgentBehavior + 'static) -> Arc<Self> {
        Self::with_behavior(config, Arc::new(behavior))
    }

    /// Like [`Agent::new`] but with an already shared behavior.
    pub fn with_behavior(config: AgentConfig, behavior: Arc<dyn AgentBehavior>) -> Arc<Self> {
        let agent = Arc::new(Self {
            config,
            shared: Mutex::new(Shared {
                state: AgentState::offline(),
                lifecycle: Lifecycle::Created,
            }),
            handlers: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            behavior,
        });

        agent.register_handler(MessageKind::Ping, |agent, message| async move {
            let payload = json!({
                "type": "pong",
                "status": agent.status(),
                "timestamp": Utc::now(),
            });
            agent.reply(&message, MessageKind::Response, payload);
            Ok(())
        });

        agent.register_handler(MessageKind::Status, |agent, message| async move {
            let payload = json!({
                "state": agent.state(),
                "config": agent.config(),
            });
            agent.reply(&message, MessageKind::Response, payload);
            Ok(())
        });

        agent
    }

    /// The agent's unique id.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Static configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Declared capabilities.
    pub fn capabilities(&self) -> &[String] {
        &self.config.capabilities
    }

    /// Snapshot of the runtime state.
    pub fn state(&self) -> AgentState {
        self.shared.lock().state.clone()
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.shared.lock().state.status
    }

    /// Current lifecycle phase.
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lock().lifecycle
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().state.current_tasks.len()
    }

    /// True iff the task's type is among the declared capabilities.
    pub fn can_handle(&self, task: &Task) -> bool {
        task.matches(&self.config.capabilities)
    }

    /// Attach an event listener. Listeners are dropped on `terminate`.
    pub fn on_event(&self, listener: impl Fn(&AgentEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Register (or replace) the handler for one message type.
    pub fn register_handler<F, Fut>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(Arc<Agent>, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskmeshResult<()>> + Send + 'static,
    {
        let boxed: MessageHandlerFn = Arc::new(
            move |agent: Arc<Agent>, message: Message| -> BoxFuture<'static, TaskmeshResult<()>> {
                Box::pin(handler(agent, message))
            },
        );
        self.handlers.write().insert(kind, boxed);
    }

    fn emit(&self, event: AgentEvent) {
        let listeners: Vec<EventListener> = self.listeners.read().clone();
        for listener in &listeners {
            listener(&event);
        }
    }

    /// Emit a log record as an event.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(AgentEvent::Log {
            agent_id: self.config.id.clone(),
            level,
            message: message.into(),
        });
    }

    /// Mark the agent idle, run the behavior's setup and emit `Initialized`.
    ///
    /// Fails if the agent was already initialized or terminated.
    pub async fn initialize(self: &Arc<Self>) -> TaskmeshResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.lifecycle != Lifecycle::Created {
                return Err(TaskmeshError::Agent(format!(
                    "Agent {} cannot be initialized twice",
                    self.config.id
                )));
            }
            shared.lifecycle = Lifecycle::Running;
            shared.state.refresh_status();
            shared.state.last_activity = Utc::now();
        }

        if let Err(e) = self.behavior.on_initialize(self).await {
            self.shared.lock().state.status = AgentStatus::Error;
            return Err(e);
        }

        info!(agent_id = %self.config.id, agent_type = %self.config.agent_type, "Agent initialized");
        self.log(LogLevel::Info, format!("Agent {} initialized", self.config.name));
        self.emit(AgentEvent::Initialized {
            agent_id: self.config.id.clone(),
        });
        Ok(())
    }

    /// Mark the agent offline, run the behavior's teardown, emit `Terminated`
    /// and drop every listener. A second call is a no-op.
    pub async fn terminate(self: &Arc<Self>) -> TaskmeshResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.lifecycle == Lifecycle::Terminated {
                return Ok(());
            }
            shared.lifecycle = Lifecycle::Terminated;
            shared.state.status = AgentStatus::Offline;
        }

        let outcome = self.behavior.on_terminate(self).await;

        info!(agent_id = %self.config.id, "Agent terminated");
        self.log(LogLevel::Info, format!("Agent {} terminated", self.config.name));
        self.emit(AgentEvent::Terminated {
            agent_id: self.config.id.clone(),
        });
        self.listeners.write().clear();
        outcome
    }

    /// Run a task through the behavior.
    ///
    /// Rejected with [`TaskmeshError::AtCapacity`] before touching any state
    /// when `max_concurrent_tasks` executions are already in flight. Once
    /// admitted, failures of the behavior are captured in the returned
    /// [`TaskResult`] and never surface as `Err`.
    pub async fn execute(self: &Arc<Self>, task: Task) -> TaskmeshResult<TaskResult> {
        {
            let mut shared = self.shared.lock();
            if shared.lifecycle != Lifecycle::Running {
                return Err(TaskmeshError::Agent(format!(
                    "Agent {} is not running",
                    self.config.id
                )));
            }
            if shared.state.current_tasks.len() >= self.config.max_concurrent_tasks {
                return Err(TaskmeshError::AtCapacity {
                    agent_id: self.config.id.clone(),
                    max: self.config.max_concurrent_tasks,
                });
            }
            shared.state.current_tasks.insert(task.id);
            shared.state.refresh_status();
            shared.state.last_activity = Utc::now();
        }

        debug!(agent_id = %self.config.id, task_id = %task.id, task_type = %task.task_type, "Executing task");
        let started = Instant::now();
        let outcome = self.behavior.on_execute(self, &task).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        {
            let mut shared = self.shared.lock();
            shared.state.current_tasks.remove(&task.id);
            match &outcome {
                Ok(_) => shared.state.error_count = 0,
                Err(_) => shared.state.error_count += 1,
            }
            if shared.lifecycle == Lifecycle::Running {
                shared.state.refresh_status();
            }
            shared.state.last_activity = Utc::now();
        }

        let result = match outcome {
            Ok(data) => {
                self.log(LogLevel::Info, format!("Task {} completed in {elapsed_ms}ms", task.id));
                TaskResult::success(task.id, &self.config.id, data, elapsed_ms)
            }
            Err(e) => {
                warn!(agent_id = %self.config.id, task_id = %task.id, error = %e, "Task execution failed");
                self.log(LogLevel::Error, format!("Task {} failed: {e}", task.id));
                TaskResult::failure(task.id, &self.config.id, e.to_string(), elapsed_ms)
            }
        };

        self.emit(AgentEvent::TaskCompleted(result.clone()));
        Ok(result)
    }

    /// Build a message from this agent and emit it for routing.
    pub fn send_message(
        &self,
        to: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Message {
        let message = Message::new(&self.config.id, to, kind, payload);
        self.emit(AgentEvent::MessageSent(message.clone()));
        message
    }

    /// Send a message to every other agent.
    pub fn broadcast(&self, kind: MessageKind, payload: serde_json::Value) -> Message {
        let message = Message::broadcast(&self.config.id, kind, payload);
        self.emit(AgentEvent::MessageSent(message.clone()));
        message
    }

    /// Answer `request`, tagging the reply with its id.
    pub fn reply(&self, request: &Message, kind: MessageKind, payload: serde_json::Value) -> Message {
        let message = Message::new(&self.config.id, request.from(), kind, payload)
            .with_correlation_id(request.id());
        self.emit(AgentEvent::MessageSent(message.clone()));
        message
    }

    /// Dispatch an inbound message to its type's handler, or the behavior's fallback.
    pub async fn receive_message(self: &Arc<Self>, message: Message) -> TaskmeshResult<()> {
        self.shared.lock().state.last_activity = Utc::now();

        let handler = self.handlers.read().get(message.kind()).cloned();
        match handler {
            Some(handler) => handler(Arc::clone(self), message).await,
            None => self.fallback(message).await,
        }
    }

    /// Hand a message straight to the behavior's generic handler.
    pub async fn fallback(self: &Arc<Self>, message: Message) -> TaskmeshResult<()> {
        self.behavior.on_message(self, message).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.config.id)
            .field("type", &self.config.agent_type)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}
