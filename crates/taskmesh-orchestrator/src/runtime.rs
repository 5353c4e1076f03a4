use crate::agent_manager::{AgentDefaults, AgentManager, AgentSpec, FactoryRegistry};
use crate::coordinator::{Coordinator, SystemStatus, COORDINATOR_ID};
use crate::task_manager::TaskManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskmesh_agent::Agent;
use taskmesh_broker::{BrokerConfig, MessageBroker};
use taskmesh_core::{NewTask, Task, TaskStatus, TaskmeshError, TaskmeshResult};
use tracing::{info, warn};
use uuid::Uuid;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything needed to assemble a [`Runtime`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Broker settings.
    pub broker: BrokerConfig,
    /// Fallback agent limits.
    pub agent_defaults: AgentDefaults,
    /// Workers registered during startup.
    pub bootstrap: Vec<AgentSpec>,
}

/// The assembled system: broker, task manager, coordinator and workers.
pub struct Runtime {
    broker: MessageBroker,
    tasks: Arc<TaskManager>,
    coordinator: Arc<Coordinator>,
    coordinator_agent: Arc<Agent>,
    agents: Arc<AgentManager>,
    accepting: AtomicBool,
}

impl Runtime {
    /// Build every component, start the coordinator and register the
    /// bootstrap workers.
    pub async fn start(config: RuntimeConfig, factories: FactoryRegistry) -> TaskmeshResult<Arc<Self>> {
        let broker = MessageBroker::new(config.broker);
        let tasks = Arc::new(TaskManager::new());
        let (coordinator_agent, coordinator) = Coordinator::create(Arc::clone(&tasks));
        let agents =
            AgentManager::start(broker.clone(), factories, config.agent_defaults, COORDINATOR_ID).await;

        agents.attach(&coordinator_agent).await?;
        info!(agent_id = COORDINATOR_ID, "Coordinator started");

        let runtime = Arc::new(Self {
            broker,
            tasks,
            coordinator,
            coordinator_agent,
            agents,
            accepting: AtomicBool::new(true),
        });

        for spec in config.bootstrap {
            let id = spec.id.clone();
            runtime.register_agent(spec).await.map_err(|e| {
                warn!(agent_id = %id, error = %e, "Bootstrap agent failed to register");
                e
            })?;
        }

        info!(
            workers = runtime.agents.list_agents().len(),
            types = ?runtime.agents.worker_types(),
            "Runtime started"
        );
        Ok(runtime)
    }

    /// The message broker.
    pub fn broker(&self) -> &MessageBroker {
        &self.broker
    }

    /// The task manager.
    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// The coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// The agent manager.
    pub fn agents(&self) -> &Arc<AgentManager> {
        &self.agents
    }

    /// Whether new work is still accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn ensure_accepting(&self) -> TaskmeshResult<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(TaskmeshError::ShuttingDown)
        }
    }

    /// Register a worker through the agent manager.
    pub async fn register_agent(&self, spec: AgentSpec) -> TaskmeshResult<Arc<Agent>> {
        self.ensure_accepting()?;
        self.agents.register_agent(spec).await
    }

    /// Unregister a worker. Allowed during shutdown.
    pub async fn unregister_agent(&self, agent_id: &str) -> TaskmeshResult<()> {
        self.agents.unregister_agent(agent_id).await
    }

    /// Create a task; the coordinator picks it up immediately.
    pub fn create_task(&self, new_task: NewTask) -> TaskmeshResult<Task> {
        self.ensure_accepting()?;
        self.tasks.create_task(new_task)
    }

    /// Manual status update. Allowed during shutdown.
    pub fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> TaskmeshResult<Task> {
        let task = self.tasks.update_task_status(task_id, status, result, error)?;
        if status.is_terminal() {
            self.coordinator.drain_all();
        }
        Ok(task)
    }

    /// Coordinator system status.
    pub fn system_status(&self) -> SystemStatus {
        self.coordinator.get_system_status()
    }

    /// Stop accepting work, let in-flight executions finish within `grace`,
    /// then terminate every worker and the coordinator.
    pub async fn shutdown(&self, grace: Duration) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        info!(grace_ms, "Runtime shutting down");

        let drained = tokio::time::timeout(grace, async {
            while self.agents.in_flight() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                in_flight = self.agents.in_flight(),
                "Grace period elapsed with executions still running"
            );
        }

        self.agents.unregister_all().await;
        if let Err(e) = self.coordinator_agent.terminate().await {
            warn!(error = %e, "Coordinator did not terminate cleanly");
        }
        self.broker.unregister(COORDINATOR_ID);
        info!("Runtime stopped");
    }
}
