//! Run-control events and the per-session event bus
//!
//! The back end publishes Suspended/Resumed events; the step queue manager
//! publishes SteppingTimedOut. Handlers register by [`EventKind`] and receive
//! events in publish order.

mod bus;
mod types;

pub use bus::{EventBus, Handler, ListenerId, Registration};
pub use types::{EventKind, RunControlEvent};
