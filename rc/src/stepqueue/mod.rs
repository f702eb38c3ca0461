//! Step queue manager
//!
//! Buffers step requests per execution context while a step is in flight and
//! issues the next one when the back end reports the context suspended. A
//! per-context timer flags steps that run longer than the stepping timeout.

mod config;
mod core;
mod handle;
mod messages;
mod queue;
mod timer;

pub use config::{DEFAULT_QUEUE_DEPTH, DrainOrder, STEPPING_TIMEOUT, StepQueueConfig};
pub use self::core::StepQueueManager;
pub use handle::StepQueueHandle;
pub use messages::{StepQueueCommand, StepQueueError, StepQueueMetrics, StepQueueResult};
