//! Run-control service boundary
//!
//! The step queue manager depends on a back end through [`RunControl`].
//! Queries are synchronous and side-effect free. Commands change state before
//! they return (a stepped context reports `is_stepping` immediately) and hand
//! back a [`Completion`] that resolves exactly once with success or failure.

mod error;
mod sim;
mod traits;

pub use error::{RunControlError, RunControlResult};
pub use sim::SimulatedRunControl;
pub use traits::{Completion, RunControl, completed, failed};
