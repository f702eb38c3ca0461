//! Domain types shared by the run-control core
//!
//! Execution contexts identify what can be run-controlled; step types and
//! state-change reasons describe what happened to them.

mod context;
mod step;

pub use context::{ContextKind, ExecutionContext, SessionId};
pub use step::{StateChangeReason, StepRequest, StepType};
