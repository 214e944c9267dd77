//! Per-engine publish/subscribe for playback notifications.
//!
//! Handlers receive each event along with a buffer they may push follow-up
//! intents into; the engine queues those and processes them once the intent
//! being handled has finished.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::schema::node::{ChoiceOption, Slot};
use crate::schema::state::PlaybackState;

/// Notifications published by the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    NodeEntered {
        node_id: String,
    },
    /// The displayed text changed. Carries the whole buffer, not a delta.
    TextRevealed {
        text: String,
    },
    RevealFinished {
        node_id: String,
        forced: bool,
    },
    ChoicesPresented {
        node_id: String,
        options: Vec<ChoiceOption>,
    },
    ChoiceMade {
        node_id: String,
        option_id: String,
    },
    /// The node already had a recorded choice. The record keeps `existing`;
    /// playback follows `attempted`.
    DuplicateChoice {
        node_id: String,
        existing: String,
        attempted: String,
    },
    /// `asset` is `None` when the slot was cleared.
    StageChanged {
        slot: Slot,
        asset: Option<String>,
    },
    AssetFailed {
        slot: Slot,
        name: String,
        reason: String,
    },
    MarkupFailed {
        node_id: String,
        reason: String,
    },
    ChapterFinished {
        node_id: String,
    },
    AutoPlayToggled {
        enabled: bool,
    },
    Restored {
        node_id: String,
    },
}

/// A player request, processed one at a time in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Advance,
    Choose(String),
    ToggleAutoPlay,
    OpenHistory,
    CloseHistory,
    Pause,
    Resume,
}

type Handler = Box<dyn FnMut(&EngineEvent, &mut Vec<Intent>) + Send>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
    dispatching: bool,
    /// Ids unsubscribed while their handler was out for dispatch.
    removed: Vec<u64>,
}

impl Registry {
    fn remove(&mut self, id: u64) {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        if self.handlers.len() == before && self.dispatching {
            self.removed.push(id);
        }
    }
}

/// Keeps a handler registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[derive(Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&EngineEvent, &mut Vec<Intent>) + Send + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Box::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every handler in subscription order and return the
    /// intents they requested.
    ///
    /// The registry is not locked while handlers run, so a handler may drop
    /// subscriptions or subscribe new handlers. New handlers start with the
    /// next event.
    pub fn publish(&self, event: &EngineEvent) -> Vec<Intent> {
        let mut handlers = {
            let mut registry = lock(&self.registry);
            registry.dispatching = true;
            std::mem::take(&mut registry.handlers)
        };

        let mut intents = Vec::new();
        for (_, handler) in handlers.iter_mut() {
            handler(event, &mut intents);
        }

        let mut registry = lock(&self.registry);
        registry.dispatching = false;
        let removed = std::mem::take(&mut registry.removed);
        handlers.retain(|(id, _)| !removed.contains(id));
        handlers.append(&mut registry.handlers);
        registry.handlers = handlers;
        intents
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).handlers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entered(id: &str) -> EngineEvent {
        EngineEvent::NodeEntered {
            node_id: id.to_string(),
        }
    }

    #[test]
    fn handlers_receive_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        let _a = bus.subscribe(move |_, _| first.lock().unwrap().push("a"));
        let _b = bus.subscribe(move |_, _| second.lock().unwrap().push("b"));
        bus.publish(&entered("n1"));
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let sub = bus.subscribe(move |_, _| *counter.lock().unwrap() += 1);
        bus.publish(&entered("n1"));
        drop(sub);
        bus.publish(&entered("n2"));
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn handlers_can_request_intents() {
        let bus = EventBus::new();
        let _sub = bus.subscribe(|event, intents| {
            if matches!(event, EngineEvent::ChoicesPresented { .. }) {
                intents.push(Intent::Choose("o1".to_string()));
            }
        });
        assert!(bus.publish(&entered("n1")).is_empty());
        let intents = bus.publish(&EngineEvent::ChoicesPresented {
            node_id: "n1".to_string(),
            options: Vec::new(),
        });
        assert_eq!(intents, vec![Intent::Choose("o1".to_string())]);
    }

    #[test]
    fn unsubscribe_during_dispatch_is_honored() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(Mutex::new(0));

        let holder = Arc::clone(&slot);
        let counter = Arc::clone(&hits);
        let sub = bus.subscribe(move |_, _| {
            *counter.lock().unwrap() += 1;
            holder.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        bus.publish(&entered("n1"));
        bus.publish(&entered("n2"));
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe(|_, _| {});
        drop(bus);
        drop(sub);
    }
}
