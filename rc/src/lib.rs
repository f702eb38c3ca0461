//! RunControl - debugger step coordination core
//!
//! Mediates step requests between front-end consumers and a debugger back
//! end. Holding down a step key produces a bounded stream of steps that never
//! races ahead of the target: requests made while a step is in flight are
//! queued per execution context and issued one at a time as the back end
//! reports the context suspended again.
//!
//! # Modules
//!
//! - [`domain`] - Execution contexts, step kinds, state-change reasons
//! - [`events`] - Run-control events and the per-session event bus
//! - [`session`] - Session lifecycle and liveness
//! - [`runcontrol`] - Back end contract and a simulated back end
//! - [`stepqueue`] - Step queue manager with timeout supervision
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod runcontrol;
pub mod session;
pub mod stepqueue;

// Re-export commonly used types
pub use config::{Config, SimulationConfig};
pub use domain::{ContextKind, ExecutionContext, SessionId, StateChangeReason, StepRequest, StepType};
pub use events::{EventBus, EventKind, ListenerId, Registration, RunControlEvent};
pub use runcontrol::{Completion, RunControl, RunControlError, RunControlResult, SimulatedRunControl};
pub use session::Session;
pub use stepqueue::{
    DrainOrder, StepQueueConfig, StepQueueError, StepQueueHandle, StepQueueManager, StepQueueMetrics,
};
