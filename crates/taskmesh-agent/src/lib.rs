//! The agent contract shared by every taskmesh worker and the coordinator.
//!
//! An [`Agent`] owns its lifecycle, bounded concurrent execution and message
//! dispatch. What it actually does comes from an [`AgentBehavior`].

pub mod agent;
pub mod behavior;
pub mod event;
/// Execute-task request handling for worker agents.
pub mod worker;

pub use agent::{Agent, Lifecycle, MessageHandlerFn};
pub use behavior::AgentBehavior;
pub use event::{AgentEvent, EventListener, LogLevel};
pub use worker::worker_agent;
