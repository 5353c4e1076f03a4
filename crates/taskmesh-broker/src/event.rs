use taskmesh_core::Message;

/// Message lifecycle notifications published by the broker.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A message entered `publish`.
    Published(Message),
    /// Every handler of a directed recipient accepted the message.
    Delivered(Message),
    /// One handler of a directed recipient failed.
    DeliveryFailed {
        /// The message being delivered.
        message: Message,
        /// The handler error, rendered.
        error: String,
    },
    /// No handler was registered; the message waits in the recipient's queue.
    Queued(Message),
    /// A queued message outlived its time-to-live.
    Expired(Message),
    /// A message reached the dead-letter list.
    MovedToDeadLetter(Message),
    /// A broadcast fanned out to the given number of handlers.
    Broadcasted {
        /// The broadcast message.
        message: Message,
        /// How many handlers were invoked.
        recipients: usize,
    },
}

/// What `publish` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReport {
    /// All handlers of the recipient accepted it.
    Delivered,
    /// The recipient has no handler yet; queued with a time-to-live.
    Queued,
    /// At least one handler failed; the message is in the dead-letter list.
    DeadLettered,
    /// Fanned out to every handler except the sender's.
    Broadcast {
        /// Handlers invoked.
        recipients: usize,
        /// Handlers that returned an error (logged, not dead-lettered).
        failures: usize,
    },
}
