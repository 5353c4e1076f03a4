//! Task scheduling and agent coordination for taskmesh.
//!
//! Tasks wait in ten priority lanes until their dependencies complete; the
//! coordinator hands each one to the least-loaded worker that declares the
//! task's type as a capability. Workers are built from a closed factory
//! table and wired into the broker by the agent manager.
//!
//! # Main types
//!
//! - [`Runtime`]: Assembles every component and owns graceful shutdown.
//! - [`TaskManager`]: Priority lanes, dependency gating and status tracking.
//! - [`Coordinator`]: Agent registry and least-loaded assignment.
//! - [`AgentManager`]: Worker instantiation, wiring and announcements.
//! - [`FactoryRegistry`]: Worker type key to constructor table.

/// Worker registration and broker wiring.
pub mod agent_manager;
/// Agent registry and task distribution.
pub mod coordinator;
/// Component assembly and shutdown.
pub mod runtime;
/// Priority lanes and task state.
pub mod task_manager;

pub use agent_manager::{
    AgentDefaults, AgentFactory, AgentManager, AgentSpec, AgentSummary, FactoryRegistry,
    ManagerEvent, WorkerDefaults, MANAGER_ID,
};
pub use coordinator::{
    Coordinator, CoordinatorInfo, RegistryEntry, SystemStatus, COORDINATOR_CAPABILITIES,
    COORDINATOR_ID,
};
pub use runtime::{Runtime, RuntimeConfig};
pub use task_manager::{StatusCounts, TaskEvent, TaskListener, TaskManager, TaskMetrics};
