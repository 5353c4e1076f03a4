use crate::event::{BrokerEvent, DeliveryReport};
use crate::handler::MessageHandler;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::Message;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a message waits for an unregistered recipient before it is dead-lettered.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(60);

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Broker tuning.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Mailbox expiry for queued messages.
    pub message_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            message_ttl: DEFAULT_MESSAGE_TTL,
        }
    }
}

#[derive(Default)]
struct BrokerState {
    handlers: HashMap<String, Vec<Arc<dyn MessageHandler>>>,
    queues: HashMap<String, VecDeque<Message>>,
    dead_letters: Vec<Message>,
    timers: HashMap<Uuid, AbortHandle>,
    /// Recipients whose backlog is being drained. New messages for them
    /// queue behind the backlog instead of overtaking it.
    flushing: HashSet<String>,
}

impl BrokerState {
    fn has_handlers(&self, agent_id: &str) -> bool {
        self.handlers.get(agent_id).is_some_and(|h| !h.is_empty())
    }

    fn take_queued(&mut self, agent_id: &str, message_id: Uuid) -> Option<Message> {
        let queue = self.queues.get_mut(agent_id)?;
        let pos = queue.iter().position(|m| m.id() == message_id)?;
        let message = queue.remove(pos);
        if queue.is_empty() && !self.flushing.contains(agent_id) {
            self.queues.remove(agent_id);
        }
        message
    }
}

struct Inner {
    config: BrokerConfig,
    state: Mutex<BrokerState>,
    events: broadcast::Sender<BrokerEvent>,
}

impl Inner {
    fn emit(&self, event: BrokerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn enqueue(self: &Arc<Self>, state: &mut BrokerState, message: Message) {
        let weak = Arc::downgrade(self);
        let ttl = self.config.message_ttl;
        let to = message.to().to_string();
        let message_id = message.id();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&to, message_id);
            }
        });

        state.timers.insert(message_id, timer.abort_handle());
        state
            .queues
            .entry(message.to().to_string())
            .or_default()
            .push_back(message);
    }

    fn expire(&self, agent_id: &str, message_id: Uuid) {
        let expired = {
            let mut state = self.state.lock();
            state.timers.remove(&message_id);
            state.take_queued(agent_id, message_id)
        };

        if let Some(message) = expired {
            warn!(
                message_id = %message_id,
                to = %agent_id,
                ttl_secs = self.config.message_ttl.as_secs(),
                "Queued message expired"
            );
            self.emit(BrokerEvent::Expired(message.clone()));
            self.dead_letter(message);
        }
    }

    fn dead_letter(&self, message: Message) {
        self.state.lock().dead_letters.push(message.clone());
        self.emit(BrokerEvent::MovedToDeadLetter(message));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for timer in self.state.get_mut().timers.values() {
            timer.abort();
        }
    }
}

/// Routes messages between agents by id.
///
/// Directed messages go to every handler registered for the recipient and
/// are dead-lettered if any of them fails. Messages for recipients without
/// a handler wait in a per-recipient FIFO queue until the recipient
/// registers or the time-to-live runs out. Broadcasts (`to == "*"`) reach
/// every handler except the sender's.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct MessageBroker {
    inner: Arc<Inner>,
}

impl MessageBroker {
    /// Create a broker with the given configuration.
    pub fn new(config: BrokerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(BrokerState::default()),
                events,
            }),
        }
    }

    /// Subscribe to message lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.inner.events.subscribe()
    }

    /// Attach a handler for `agent_id` and deliver its backlog in enqueue order.
    ///
    /// Messages published for `agent_id` while the backlog drains are
    /// appended to it, so they arrive after everything already queued.
    pub async fn register(&self, agent_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let agent_id = agent_id.into();
        let should_flush = {
            let mut state = self.inner.state.lock();
            state
                .handlers
                .entry(agent_id.clone())
                .or_default()
                .push(handler);
            let has_backlog = state.queues.get(&agent_id).is_some_and(|q| !q.is_empty());
            has_backlog && state.flushing.insert(agent_id.clone())
        };

        info!(agent_id = %agent_id, "Mailbox registered");

        if should_flush {
            self.flush(&agent_id).await;
        }
    }

    /// Remove every handler for `agent_id`. Queued messages stay queued.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.inner.state.lock().handlers.remove(agent_id).is_some();
        if removed {
            info!(agent_id = %agent_id, "Mailbox unregistered");
        }
        removed
    }

    async fn flush(&self, agent_id: &str) {
        let mut delivered = 0usize;
        loop {
            let next = {
                let mut state = self.inner.state.lock();
                let next = if state.has_handlers(agent_id) {
                    state.queues.get_mut(agent_id).and_then(VecDeque::pop_front)
                } else {
                    None
                };
                match &next {
                    Some(message) => {
                        if let Some(timer) = state.timers.remove(&message.id()) {
                            timer.abort();
                        }
                    }
                    None => {
                        state.flushing.remove(agent_id);
                        if state.queues.get(agent_id).is_some_and(VecDeque::is_empty) {
                            state.queues.remove(agent_id);
                        }
                    }
                }
                next.map(|m| (m, state.handlers.get(agent_id).cloned().unwrap_or_default()))
            };

            let Some((message, handlers)) = next else {
                break;
            };
            self.deliver(handlers, message).await;
            delivered += 1;
        }
        debug!(agent_id = %agent_id, delivered, "Backlog flushed");
    }

    /// Route a message. Never fails; the outcome is reported and emitted as events.
    pub async fn publish(&self, message: Message) -> DeliveryReport {
        self.inner.emit(BrokerEvent::Published(message.clone()));

        if message.is_broadcast() {
            return self.broadcast(message).await;
        }

        let handlers = {
            let mut state = self.inner.state.lock();
            let to = message.to();
            if state.flushing.contains(to) || !state.has_handlers(to) {
                self.inner.enqueue(&mut state, message.clone());
                None
            } else {
                state.handlers.get(to).cloned()
            }
        };

        match handlers {
            Some(handlers) => self.deliver(handlers, message).await,
            None => {
                debug!(message_id = %message.id(), to = %message.to(), "Recipient not registered, message queued");
                self.inner.emit(BrokerEvent::Queued(message));
                DeliveryReport::Queued
            }
        }
    }

    async fn deliver(&self, handlers: Vec<Arc<dyn MessageHandler>>, message: Message) -> DeliveryReport {
        let results = join_all(handlers.iter().map(|h| h.handle(message.clone()))).await;

        let mut failed = false;
        for err in results.into_iter().filter_map(Result::err) {
            warn!(
                message_id = %message.id(),
                to = %message.to(),
                kind = %message.kind(),
                error = %err,
                "Message delivery failed"
            );
            self.inner.emit(BrokerEvent::DeliveryFailed {
                message: message.clone(),
                error: err.to_string(),
            });
            failed = true;
        }

        if failed {
            self.inner.dead_letter(message);
            DeliveryReport::DeadLettered
        } else {
            debug!(message_id = %message.id(), to = %message.to(), "Message delivered");
            self.inner.emit(BrokerEvent::Delivered(message));
            DeliveryReport::Delivered
        }
    }

    async fn broadcast(&self, message: Message) -> DeliveryReport {
        let targets: Vec<(String, Arc<dyn MessageHandler>)> = {
            let state = self.inner.state.lock();
            state
                .handlers
                .iter()
                .filter(|(id, _)| id.as_str() != message.from())
                .flat_map(|(id, hs)| hs.iter().map(move |h| (id.clone(), Arc::clone(h))))
                .collect()
        };

        let results = join_all(targets.iter().map(|(_, h)| h.handle(message.clone()))).await;

        let mut failures = 0usize;
        for ((agent_id, _), result) in targets.iter().zip(results) {
            if let Err(e) = result {
                warn!(agent_id = %agent_id, message_id = %message.id(), error = %e, "Broadcast delivery failed");
                failures += 1;
            }
        }

        let recipients = targets.len();
        self.inner.emit(BrokerEvent::Broadcasted {
            message,
            recipients,
        });
        DeliveryReport::Broadcast {
            recipients,
            failures,
        }
    }

    /// Messages waiting for `agent_id`, oldest first.
    pub fn get_queued_messages(&self, agent_id: &str) -> Vec<Message> {
        self.inner
            .state
            .lock()
            .queues
            .get(agent_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every message that failed delivery or expired, in arrival order.
    pub fn get_dead_letter_messages(&self) -> Vec<Message> {
        self.inner.state.lock().dead_letters.clone()
    }

    /// Empty the dead-letter list, returning how many messages were dropped.
    pub fn clear_dead_letter_queue(&self) -> usize {
        let mut state = self.inner.state.lock();
        let count = state.dead_letters.len();
        state.dead_letters.clear();
        count
    }

    /// Ids with at least one handler, sorted.
    pub fn registered_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.state.lock().handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `agent_id` has a handler.
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner.state.lock().has_handlers(agent_id)
    }
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
