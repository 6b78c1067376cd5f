//! Typed topic fan-out for decoded inbound messages.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error};

use super::message::{InboundMessage, Topic};

/// Subscriber callback. Identity (for de-duplication) is the `Arc` allocation.
pub type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registered {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<Topic, Vec<Registered>>,
}

impl Registry {
    fn insert(&mut self, topic: Topic, handler: Handler) -> SubscriptionId {
        let entries = self.topics.entry(topic).or_default();
        if let Some(existing) = entries.iter().find(|r| Arc::ptr_eq(&r.handler, &handler)) {
            return existing.id;
        }
        self.next_id = self.next_id.wrapping_add(1);
        let id = SubscriptionId(self.next_id);
        entries.push(Registered { id, handler });
        id
    }

    fn remove(&mut self, topic: Topic, id: SubscriptionId) -> bool {
        let Some(entries) = self.topics.get_mut(&topic) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|r| r.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.topics.remove(&topic);
        }
        removed
    }
}

/// Topic -> ordered handler set.
///
/// Cloning is cheap and every clone shares the same registry. Delivery is synchronous and in
/// registration order; a panicking handler is logged and does not stop delivery to the rest.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Handlers never run under this lock, so a poisoned guard still holds consistent data.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `topic`. Registering the same `Arc` again is a no-op that
    /// returns a handle to the existing registration.
    pub fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        let id = self.lock().insert(topic, handler);
        debug!(topic = %topic, id = id.0, "subscriber registered");
        Subscription {
            topic,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscribe_fn<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.subscribe(topic, Arc::new(handler))
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().topics.get(&topic).map_or(0, Vec::len)
    }

    /// Deliver `message` to every handler of its topic. Returns how many handlers completed
    /// without panicking.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let topic = message.topic();
        let handlers: Vec<(SubscriptionId, Handler)> = match self.lock().topics.get(&topic) {
            Some(entries) => entries
                .iter()
                .map(|r| (r.id, Arc::clone(&r.handler)))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    error!(topic = %topic, id = id.0, panic = %detail, "subscriber panicked");
                }
            }
        }
        delivered
    }
}

/// Disposer returned by [`Dispatcher::subscribe`].
///
/// Dropping it leaves the handler registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: Topic,
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler. Safe to call repeatedly and after the dispatcher is gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.remove(self.topic, self.id)
    }
}
