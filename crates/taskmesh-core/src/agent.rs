use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Default number of tasks an agent runs at once.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 1;
/// Default advisory execution timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_max_concurrent_tasks() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Static configuration of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Unique, stable identifier. Also the broker mailbox name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Worker type key used to pick a factory.
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Task types this agent can execute.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Concurrency limit enforced by `execute`.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Stored but not enforced.
    #[serde(default = "default_timeout_ms", rename = "timeout")]
    pub timeout_ms: u64,
}

impl AgentConfig {
    /// A config with defaults for concurrency and timeout.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            capabilities,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Override the concurrency limit.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Override the advisory timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Coarse runtime status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Initialized with nothing in flight.
    Idle,
    /// At least one task in flight.
    Busy,
    /// Reserved for agents reporting a fault.
    Error,
    /// Not yet initialized, or terminated.
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Mutable runtime state of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    /// Current status.
    pub status: AgentStatus,
    /// Ids of in-flight tasks.
    pub current_tasks: BTreeSet<Uuid>,
    /// Last time the agent started or finished work.
    pub last_activity: DateTime<Utc>,
    /// Consecutive failed executions; reset on success.
    pub error_count: u32,
}

impl AgentState {
    /// State of an agent that has not been initialized yet.
    pub fn offline() -> Self {
        Self {
            status: AgentStatus::Offline,
            current_tasks: BTreeSet::new(),
            last_activity: Utc::now(),
            error_count: 0,
        }
    }

    /// Recompute `status` from the in-flight set: busy iff non-empty.
    pub fn refresh_status(&mut self) {
        self.status = if self.current_tasks.is_empty() {
            AgentStatus::Idle
        } else {
            AgentStatus::Busy
        };
    }
}
