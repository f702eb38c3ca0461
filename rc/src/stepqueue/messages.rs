//! Message types for the step queue manager

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{ExecutionContext, StepRequest, StepType};
use crate::events::RunControlEvent;

/// Errors from step queue handle operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepQueueError {
    #[error("Step queue manager is not running")]
    Closed,

    #[error("Step queue manager dropped the reply")]
    NoReply,
}

pub type StepQueueResult<T> = Result<T, StepQueueError>;

/// Work items for the manager's serial executor
#[derive(Debug)]
pub enum StepQueueCommand {
    /// Step now if possible, otherwise queue within the depth limit
    Enqueue {
        context: ExecutionContext,
        request: StepRequest,
    },

    /// Whether a step of this kind would be executed or queued
    CanEnqueue {
        context: ExecutionContext,
        step_type: StepType,
        instruction: bool,
        reply: oneshot::Sender<bool>,
    },

    PendingCount {
        context: ExecutionContext,
        reply: oneshot::Sender<usize>,
    },

    IsTimedOut {
        context: ExecutionContext,
        reply: oneshot::Sender<bool>,
    },

    SetDepth { depth: usize },

    GetDepth { reply: oneshot::Sender<usize> },

    /// Event delivered by the session bus
    Event(RunControlEvent),

    /// Stepping timer elapsed (internal)
    TimerExpired { context: ExecutionContext, generation: u64 },

    GetMetrics { reply: oneshot::Sender<StepQueueMetrics> },

    /// Stop the executor, dropping queues and timers
    Shutdown,
}

/// Step queue counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepQueueMetrics {
    /// Steps forwarded to the run-control service
    pub dispatched: u64,
    /// Steps accepted into a queue
    pub queued: u64,
    /// Steps dropped because the queue was full or the context could not step
    pub dropped: u64,
    /// Queued steps discarded because the context could no longer step
    pub flushed: u64,
    /// Stepping timeouts published
    pub timeouts: u64,
    /// Resumed(Step) received while a timer was already armed
    pub protocol_violations: u64,
    /// Contexts currently holding queued steps
    pub queued_contexts: usize,
    /// Timers currently armed or fired and not yet cancelled
    pub active_timers: usize,
}
