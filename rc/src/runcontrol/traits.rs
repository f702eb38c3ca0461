//! Run-control trait definition

use futures::FutureExt;
use futures::future::BoxFuture;

use super::error::{RunControlError, RunControlResult};
use crate::domain::{ExecutionContext, StepType};

/// Completion of an asynchronous run-control command
///
/// Resolves exactly once. Dropping it does not cancel the command.
pub type Completion = BoxFuture<'static, RunControlResult<()>>;

/// Completion that is already successful
pub fn completed() -> Completion {
    futures::future::ready(Ok(())).boxed()
}

/// Completion that has already failed with `error`
pub fn failed(error: RunControlError) -> Completion {
    futures::future::ready(Err(error)).boxed()
}

/// Resume/suspend/step primitives of a debugger back end
pub trait RunControl: Send + Sync {
    fn is_suspended(&self, context: &ExecutionContext) -> bool;

    fn is_stepping(&self, context: &ExecutionContext) -> bool;

    fn can_resume(&self, context: &ExecutionContext) -> bool;

    fn can_suspend(&self, context: &ExecutionContext) -> bool;

    /// Whether a source-level step of `step_type` can be issued right now
    fn can_step(&self, context: &ExecutionContext, step_type: StepType) -> bool;

    /// Whether an instruction-level step of `step_type` can be issued right now
    fn can_instruction_step(&self, context: &ExecutionContext, step_type: StepType) -> bool;

    fn resume(&self, context: &ExecutionContext) -> Completion;

    fn suspend(&self, context: &ExecutionContext) -> Completion;

    fn step(&self, context: &ExecutionContext, step_type: StepType) -> Completion;

    fn instruction_step(&self, context: &ExecutionContext, step_type: StepType) -> Completion;
}
