use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskmesh_agent::{Agent, AgentEvent, LogLevel};
use taskmesh_broker::{handler_fn, MessageBroker, MessageHandler};
use taskmesh_core::protocol::{AgentDeregistration, AgentRegistration};
use taskmesh_core::{
    AgentConfig, AgentState, AgentStatus, Message, MessageKind, TaskResult, TaskmeshError,
    TaskmeshResult,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Mailbox id the manager uses for its own announcements.
pub const MANAGER_ID: &str = "agent-manager";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Builds an agent of one worker type from its final configuration.
pub type AgentFactory = Arc<dyn Fn(AgentConfig) -> Arc<Agent> + Send + Sync>;

/// Defaults a worker type applies when a registration leaves them out.
#[derive(Debug, Clone, Default)]
pub struct WorkerDefaults {
    /// Capabilities used when the registration lists none.
    pub capabilities: Vec<String>,
    /// Concurrency limit used when the registration gives none.
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Clone)]
struct WorkerFactory {
    defaults: WorkerDefaults,
    build: AgentFactory,
}

/// Closed table of worker types, populated at startup.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, WorkerFactory>,
}

impl FactoryRegistry {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker type. A later registration for the same key replaces it.
    pub fn register(
        &mut self,
        agent_type: impl Into<String>,
        defaults: WorkerDefaults,
        build: impl Fn(AgentConfig) -> Arc<Agent> + Send + Sync + 'static,
    ) {
        let agent_type = agent_type.into();
        info!(agent_type = %agent_type, "Worker type registered");
        self.factories.insert(
            agent_type,
            WorkerFactory {
                defaults,
                build: Arc::new(build),
            },
        );
    }

    /// Whether a type key is known.
    pub fn contains(&self, agent_type: &str) -> bool {
        self.factories.contains_key(agent_type)
    }

    /// Known type keys, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    fn get(&self, agent_type: &str) -> Option<&WorkerFactory> {
        self.factories.get(agent_type)
    }
}

/// Fallback limits for agents whose type sets none.
#[derive(Debug, Clone, Copy)]
pub struct AgentDefaults {
    /// Default concurrency limit.
    pub max_concurrent_tasks: usize,
    /// Default advisory timeout.
    pub timeout_ms: u64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: taskmesh_core::agent::DEFAULT_MAX_CONCURRENT_TASKS,
            timeout_ms: taskmesh_core::agent::DEFAULT_TIMEOUT_MS,
        }
    }
}

/// A request to instantiate and register a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Worker type key.
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Overrides the type's default capabilities when non-empty.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Overrides the type's concurrency limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
    /// Overrides the advisory timeout.
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl AgentSpec {
    /// A spec that takes every default from the worker type.
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            capabilities: Vec::new(),
            max_concurrent_tasks: None,
            timeout_ms: None,
        }
    }

    /// Override capabilities.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Public description of a managed agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    /// Agent id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Worker type key.
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Current status.
    pub status: AgentStatus,
    /// Concurrency limit.
    pub max_concurrent_tasks: usize,
}

impl From<&Agent> for AgentSummary {
    fn from(agent: &Agent) -> Self {
        let config = agent.config();
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            agent_type: config.agent_type.clone(),
            capabilities: config.capabilities.clone(),
            status: agent.status(),
            max_concurrent_tasks: config.max_concurrent_tasks,
        }
    }
}

/// Notifications from the agent manager.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A worker was instantiated, initialized and announced.
    Registered {
        /// Worker id.
        agent_id: String,
        /// Worker type.
        agent_type: String,
    },
    /// A worker was announced as gone and terminated.
    Unregistered {
        /// Worker id.
        agent_id: String,
    },
    /// A worker finished a task.
    TaskCompleted(TaskResult),
}

struct Mailbox(Arc<Agent>);

#[async_trait]
impl MessageHandler for Mailbox {
    async fn handle(&self, message: Message) -> TaskmeshResult<()> {
        self.0.receive_message(message).await
    }
}

/// Instantiates workers and wires them into the broker.
///
/// Every managed agent gets an outbox: its `MessageSent` events are
/// published in order by a dedicated task, and each `TaskCompleted` result
/// is republished as a `task-result` message to the coordinator.
pub struct AgentManager {
    broker: MessageBroker,
    factories: FactoryRegistry,
    defaults: AgentDefaults,
    coordinator_id: String,
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    events: broadcast::Sender<ManagerEvent>,
}

impl AgentManager {
    /// Build the manager and attach its own mailbox for acknowledgements.
    pub async fn start(
        broker: MessageBroker,
        factories: FactoryRegistry,
        defaults: AgentDefaults,
        coordinator_id: impl Into<String>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Arc::new(Self {
            broker,
            factories,
            defaults,
            coordinator_id: coordinator_id.into(),
            agents: RwLock::new(HashMap::new()),
            events,
        });

        manager
            .broker
            .register(
                MANAGER_ID,
                handler_fn(|message: Message| async move {
                    debug!(from = %message.from(), kind = %message.kind(), payload = %message.payload(), "Manager received reply");
                    Ok::<(), TaskmeshError>(())
                }),
            )
            .await;

        manager
    }

    /// Subscribe to manager events.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// The broker agents are wired into.
    pub fn broker(&self) -> &MessageBroker {
        &self.broker
    }

    /// Known worker type keys.
    pub fn worker_types(&self) -> Vec<String> {
        self.factories.types()
    }

    /// Wire an already built agent: outbox, initialize, mailbox.
    ///
    /// Used for the coordinator and by [`register_agent`](Self::register_agent).
    /// The agent is not announced and not tracked as a worker.
    pub async fn attach(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        let (outbox, mut pending) = mpsc::unbounded_channel::<Message>();
        let coordinator_id = self.coordinator_id.clone();
        let events = self.events.clone();

        agent.on_event(move |event| match event {
            AgentEvent::MessageSent(message) => {
                // Closed only after terminate, when listeners are gone too.
                let _ = outbox.send(message.clone());
            }
            AgentEvent::TaskCompleted(result) => {
                match serde_json::to_value(result) {
                    Ok(payload) => {
                        let report =
                            Message::new(&result.agent_id, &coordinator_id, MessageKind::TaskResult, payload);
                        let _ = outbox.send(report);
                    }
                    Err(e) => error!(task_id = %result.task_id, error = %e, "Could not encode task result"),
                }
                let _ = events.send(ManagerEvent::TaskCompleted(result.clone()));
            }
            AgentEvent::Log {
                agent_id,
                level,
                message,
            } => match level {
                LogLevel::Debug => debug!(agent_id = %agent_id, "{message}"),
                LogLevel::Info => info!(agent_id = %agent_id, "{message}"),
                LogLevel::Warn => warn!(agent_id = %agent_id, "{message}"),
                LogLevel::Error => error!(agent_id = %agent_id, "{message}"),
            },
            AgentEvent::Initialized { agent_id } => debug!(agent_id = %agent_id, "Agent event: initialized"),
            AgentEvent::Terminated { agent_id } => debug!(agent_id = %agent_id, "Agent event: terminated"),
        });

        let broker = self.broker.clone();
        let agent_id = agent.id().to_string();
        tokio::spawn(async move {
            while let Some(message) = pending.recv().await {
                broker.publish(message).await;
            }
            debug!(agent_id = %agent_id, "Outbox closed");
        });

        agent.initialize().await?;
        self.broker
            .register(agent.id(), Arc::new(Mailbox(Arc::clone(agent))))
            .await;
        Ok(())
    }

    /// Instantiate a worker from the factory table, wire it and announce it
    /// to the coordinator.
    pub async fn register_agent(&self, spec: AgentSpec) -> TaskmeshResult<Arc<Agent>> {
        if self.agents.read().contains_key(&spec.id) {
            return Err(TaskmeshError::AgentExists(spec.id));
        }
        let factory = self
            .factories
            .get(&spec.agent_type)
            .ok_or_else(|| TaskmeshError::UnknownAgentType(spec.agent_type.clone()))?;

        let capabilities = if spec.capabilities.is_empty() {
            factory.defaults.capabilities.clone()
        } else {
            spec.capabilities.clone()
        };
        let max_concurrent_tasks = spec
            .max_concurrent_tasks
            .or(factory.defaults.max_concurrent_tasks)
            .unwrap_or(self.defaults.max_concurrent_tasks);
        let config = AgentConfig::new(&spec.id, &spec.name, &spec.agent_type, capabilities)
            .with_max_concurrent_tasks(max_concurrent_tasks)
            .with_timeout_ms(spec.timeout_ms.unwrap_or(self.defaults.timeout_ms));

        let agent = (factory.build)(config);

        {
            let mut agents = self.agents.write();
            if agents.contains_key(agent.id()) {
                return Err(TaskmeshError::AgentExists(spec.id));
            }
            agents.insert(agent.id().to_string(), Arc::clone(&agent));
        }

        if let Err(e) = self.attach(&agent).await {
            self.agents.write().remove(agent.id());
            self.broker.unregister(agent.id());
            let _ = agent.terminate().await;
            return Err(e);
        }

        let registration = AgentRegistration {
            agent_id: agent.id().to_string(),
            capabilities: agent.capabilities().to_vec(),
            max_concurrent_tasks: Some(agent.config().max_concurrent_tasks),
        };
        self.announce(MessageKind::AgentRegister, serde_json::to_value(registration)?)
            .await;

        info!(agent_id = %agent.id(), agent_type = %spec.agent_type, "Agent registered");
        let _ = self.events.send(ManagerEvent::Registered {
            agent_id: agent.id().to_string(),
            agent_type: spec.agent_type,
        });
        Ok(agent)
    }

    /// Announce the worker's departure, terminate it and drop its mailbox.
    pub async fn unregister_agent(&self, agent_id: &str) -> TaskmeshResult<()> {
        let agent = self
            .agents
            .write()
            .remove(agent_id)
            .ok_or_else(|| TaskmeshError::AgentNotFound(agent_id.to_string()))?;

        let deregistration = AgentDeregistration {
            agent_id: agent_id.to_string(),
        };
        self.announce(MessageKind::AgentUnregister, serde_json::to_value(deregistration)?)
            .await;

        let terminated = agent.terminate().await;
        self.broker.unregister(agent_id);

        info!(agent_id = %agent_id, "Agent unregistered");
        let _ = self.events.send(ManagerEvent::Unregistered {
            agent_id: agent_id.to_string(),
        });
        terminated
    }

    async fn announce(&self, kind: MessageKind, payload: serde_json::Value) {
        let message = Message::new(MANAGER_ID, &self.coordinator_id, kind, payload);
        self.broker.publish(message).await;
    }

    /// One managed worker.
    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.read().get(agent_id).cloned()
    }

    /// Every managed worker, sorted by id.
    pub fn list_agents(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        agents
    }

    /// Live runtime state of one worker.
    pub fn agent_status(&self, agent_id: &str) -> Option<AgentState> {
        self.agents.read().get(agent_id).map(|a| a.state())
    }

    /// Executions in flight across every managed worker.
    pub fn in_flight(&self) -> usize {
        self.agents.read().values().map(|a| a.in_flight()).sum()
    }

    /// Unregister every managed worker.
    pub async fn unregister_all(&self) {
        let ids: Vec<String> = self.agents.read().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.unregister_agent(&id).await {
                warn!(agent_id = %id, error = %e, "Agent did not terminate cleanly");
            }
        }
    }
}
