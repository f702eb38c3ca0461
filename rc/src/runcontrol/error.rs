//! Run-control error types

use thiserror::Error;

use crate::domain::ExecutionContext;

/// Failures reported through a command's completion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunControlError {
    #[error("Unknown execution context: {0}")]
    UnknownContext(ExecutionContext),

    #[error("Context {0} is not suspended")]
    NotSuspended(ExecutionContext),

    #[error("Context {0} is already suspended")]
    AlreadySuspended(ExecutionContext),

    #[error("Operation not supported on {context}: {reason}")]
    NotSupported { context: ExecutionContext, reason: String },

    #[error("Back end error: {0}")]
    Backend(String),

    #[error("Session closed")]
    SessionClosed,
}

pub type RunControlResult<T> = Result<T, RunControlError>;
