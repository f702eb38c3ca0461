//! Debug session - owner of the event bus and authority on liveness
//!
//! Sessions are constructed explicitly and closed explicitly; nothing in the
//! crate reaches for a global session registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::domain::{ExecutionContext, SessionId};
use crate::events::{EventBus, RunControlEvent};

pub struct Session {
    id: SessionId,
    bus: Arc<EventBus>,
    active: AtomicBool,
}

impl Session {
    /// Open a new active session with an empty event bus
    pub fn open() -> Arc<Self> {
        let id = SessionId::new();
        info!(session_id = %id, "Session opened");
        Arc::new(Self {
            id,
            bus: Arc::new(EventBus::new()),
            active: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Thread context owned by this session
    pub fn thread(&self, id: &str) -> ExecutionContext {
        ExecutionContext::thread(self.id, id)
    }

    /// Container context owned by this session
    pub fn container(&self, id: &str) -> ExecutionContext {
        ExecutionContext::container(self.id, id)
    }

    /// Publish on the session bus; dropped once the session is closed
    pub fn publish(&self, event: RunControlEvent) {
        if !self.is_active() {
            debug!(session_id = %self.id, kind = %event.kind(), "Session::publish: session closed, dropping");
            return;
        }
        self.bus.publish(event);
    }

    /// Mark the session inactive and drop every registered handler
    ///
    /// Idempotent.
    pub fn close(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.bus.clear();
            info!(session_id = %self.id, "Session closed");
        }
    }
}
