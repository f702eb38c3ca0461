//! Event Bus - per-session dispatch table of run-control event handlers
//!
//! Handlers are registered against an [`EventKind`] and invoked synchronously
//! by [`EventBus::publish`]. Dispatch holds the table lock, so events from
//! concurrent publishers are delivered one at a time and every handler sees
//! them in the same order. Handlers must be quick and must not publish on the
//! same bus; components that need to do real work forward the event into
//! their own executor channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::types::{EventKind, RunControlEvent};

/// Callback invoked for every published event of the registered kind
pub type Handler = Arc<dyn Fn(&RunControlEvent) + Send + Sync>;

/// Identifies one component's set of handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    listener: ListenerId,
    handler: Handler,
}

type DispatchTable = HashMap<EventKind, Vec<Subscription>>;

/// Per-session event bus
pub struct EventBus {
    table: Mutex<DispatchTable>,
    next_listener: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        debug!("EventBus::new: creating event bus");
        Self {
            table: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    fn table(&self) -> MutexGuard<'_, DispatchTable> {
        // A panicking handler must not wedge the whole session
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a listener id for a component about to register handlers
    pub fn listener(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `handler` for every event of `kind`
    pub fn register<F>(&self, listener: ListenerId, kind: EventKind, handler: F)
    where
        F: Fn(&RunControlEvent) + Send + Sync + 'static,
    {
        debug!(?listener, %kind, "EventBus::register");
        self.table().entry(kind).or_default().push(Subscription {
            listener,
            handler: Arc::new(handler),
        });
    }

    /// Remove every handler registered by `listener`
    ///
    /// Returns the number of handlers removed.
    pub fn unregister(&self, listener: ListenerId) -> usize {
        let mut table = self.table();
        let mut removed = 0;
        for subscriptions in table.values_mut() {
            let before = subscriptions.len();
            subscriptions.retain(|s| s.listener != listener);
            removed += before - subscriptions.len();
        }
        table.retain(|_, subscriptions| !subscriptions.is_empty());
        debug!(?listener, removed, "EventBus::unregister");
        removed
    }

    /// Drop every handler on the bus
    pub fn clear(&self) {
        debug!("EventBus::clear");
        self.table().clear();
    }

    /// Deliver `event` to all handlers registered for its kind
    pub fn publish(&self, event: RunControlEvent) {
        let table = self.table();
        let Some(subscriptions) = table.get(&event.kind()) else {
            debug!(kind = %event.kind(), context = %event.context(), "EventBus::publish: no handlers");
            return;
        };
        debug!(
            kind = %event.kind(),
            context = %event.context(),
            handlers = subscriptions.len(),
            "EventBus::publish"
        );
        for subscription in subscriptions {
            (subscription.handler)(&event);
        }
    }

    /// Number of handlers currently registered, across all kinds
    pub fn handler_count(&self) -> usize {
        self.table().values().map(|s| s.len()).sum()
    }

    /// Forward events of the given kinds into a channel
    ///
    /// Convenience for observers (CLI, tests) that want to consume events
    /// asynchronously. Dropping the returned [`Registration`] stops delivery.
    pub fn forward(self: &Arc<Self>, kinds: &[EventKind]) -> (Registration, mpsc::UnboundedReceiver<RunControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = self.listener();
        for kind in kinds {
            let tx = tx.clone();
            self.register(listener, *kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        (Registration::new(self.clone(), listener), rx)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a listener's handlers when dropped
pub struct Registration {
    bus: Arc<EventBus>,
    listener: ListenerId,
}

impl Registration {
    pub fn new(bus: Arc<EventBus>, listener: ListenerId) -> Self {
        Self { bus, listener }
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.bus.unregister(self.listener);
    }
}
