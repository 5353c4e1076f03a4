//! Core types and error definitions for the taskmesh runtime.
//!
//! This crate provides the foundational types shared across all taskmesh
//! crates: error handling, the message envelope, tasks and agent state.
//!
//! # Main types
//!
//! - [`TaskmeshError`]: Unified error enum for all taskmesh subsystems.
//! - [`TaskmeshResult`]: Convenience alias for `Result<T, TaskmeshError>`.
//! - [`Message`] / [`MessageKind`]: Envelope routed by the broker.
//! - [`Task`] / [`TaskStatus`] / [`TaskResult`]: Units of work and their outcome.
//! - [`AgentConfig`] / [`AgentState`]: Static and runtime description of an agent.
//! - [`protocol`]: Typed payloads of the coordination messages.

/// Agent configuration and runtime state.
pub mod agent;
/// Error types.
pub mod error;
/// Message envelope and type tags.
pub mod message;
pub mod protocol;
/// Tasks, statuses and execution results.
pub mod task;

pub use agent::{AgentConfig, AgentState, AgentStatus};
pub use error::{TaskmeshError, TaskmeshResult};
pub use message::{Message, MessageKind, BROADCAST};
pub use task::{NewTask, Task, TaskResult, TaskStatus, MAX_PRIORITY, MIN_PRIORITY};
