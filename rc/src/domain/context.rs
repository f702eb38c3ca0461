//! Execution context identity
//!
//! Contexts are created by the run-control back end. The core only compares
//! and hashes them, so equality covers the owning session as well as the id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unique identifier of a debug session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Generate a fresh, time-ordered session id
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Short hex prefix for log output
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of entity a context names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    /// A process or other group of threads
    Container,
    /// A single thread of execution
    Thread,
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Thread => write!(f, "thread"),
        }
    }
}

/// Identity of a debuggable thread, process or container
///
/// Immutable and cheap to clone. Two contexts are equal only when session,
/// kind and id all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionContext {
    session_id: SessionId,
    kind: ContextKind,
    id: Arc<str>,
}

impl ExecutionContext {
    pub fn new(session_id: SessionId, kind: ContextKind, id: impl Into<Arc<str>>) -> Self {
        Self {
            session_id,
            kind,
            id: id.into(),
        }
    }

    /// Context for a thread owned by `session_id`
    pub fn thread(session_id: SessionId, id: impl Into<Arc<str>>) -> Self {
        Self::new(session_id, ContextKind::Thread, id)
    }

    /// Context for a process or container owned by `session_id`
    pub fn container(session_id: SessionId, id: impl Into<Arc<str>>) -> Self {
        Self::new(session_id, ContextKind::Container, id)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_container(&self) -> bool {
        self.kind == ContextKind::Container
    }
}

impl std::fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}[{}]", self.session_id.short(), self.kind, self.id)
    }
}
