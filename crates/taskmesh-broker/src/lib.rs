//! In-process message broker for taskmesh agents.
//!
//! Agents attach a [`MessageHandler`] under their id. Directed messages to
//! ids without a handler wait in a mailbox until the recipient registers or
//! the time-to-live expires; failed or expired deliveries end up in a
//! dead-letter list.
//!
//! # Main types
//!
//! - [`MessageBroker`]: Routes, queues, broadcasts and dead-letters messages.
//! - [`MessageHandler`]: Trait implemented by anything that receives messages.
//! - [`BrokerEvent`]: Message lifecycle notifications.

/// Message broker implementation.
pub mod broker;
/// Broker lifecycle events and delivery outcomes.
pub mod event;
/// Handler trait and closure adapter.
pub mod handler;

pub use broker::{BrokerConfig, MessageBroker, DEFAULT_MESSAGE_TTL};
pub use event::{BrokerEvent, DeliveryReport};
pub use handler::{handler_fn, FnHandler, MessageHandler};
