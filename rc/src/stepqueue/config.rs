//! Step queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default number of steps buffered per context
pub const DEFAULT_QUEUE_DEPTH: usize = 3;

/// Default time a step may run before it is flagged as stuck
pub const STEPPING_TIMEOUT: Duration = Duration::from_millis(500);

/// Which end of a context's queue is taken when the context stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Oldest request first: steps replay in the order they were pressed
    #[default]
    Fifo,
    /// Most recent request first
    Lifo,
}

/// Step queue manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepQueueConfig {
    /// Maximum pending steps per execution context
    #[serde(rename = "queue-depth", default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Milliseconds after Resumed(Step) before a step counts as timed out
    #[serde(rename = "stepping-timeout-ms", default = "default_stepping_timeout_ms")]
    pub stepping_timeout_ms: u64,

    /// Drain order for queued steps
    #[serde(rename = "drain-order", default)]
    pub drain_order: DrainOrder,
}

fn default_queue_depth() -> usize {
    debug!("default_queue_depth: called");
    DEFAULT_QUEUE_DEPTH
}

fn default_stepping_timeout_ms() -> u64 {
    debug!("default_stepping_timeout_ms: called");
    STEPPING_TIMEOUT.as_millis() as u64
}

impl Default for StepQueueConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            stepping_timeout_ms: STEPPING_TIMEOUT.as_millis() as u64,
            drain_order: DrainOrder::Fifo,
        }
    }
}

impl StepQueueConfig {
    pub fn stepping_timeout(&self) -> Duration {
        Duration::from_millis(self.stepping_timeout_ms)
    }
}
