//! Timeout supervision for in-flight steps
//!
//! One timer per context, armed on Resumed(Step) and cancelled on Suspended.
//! Expiry is not acted on directly: the timer task posts
//! [`StepQueueCommand::TimerExpired`] back to the manager's executor, which
//! checks the generation so a timer cancelled after it fired is ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::domain::ExecutionContext;

use super::messages::StepQueueCommand;

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    abort: AbortHandle,
    fired: bool,
}

/// A timer was armed for a context that already has one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerAlreadyArmed {
    pub fired: bool,
}

#[derive(Debug)]
pub(crate) struct TimeoutSupervisor {
    timeout: Duration,
    timers: HashMap<ExecutionContext, PendingTimer>,
    next_generation: u64,
}

impl TimeoutSupervisor {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            timers: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Start the timer for `context`
    ///
    /// Fails without touching the existing timer if one is already present.
    pub(crate) fn arm(
        &mut self,
        context: &ExecutionContext,
        tx: mpsc::WeakUnboundedSender<StepQueueCommand>,
    ) -> Result<(), TimerAlreadyArmed> {
        if let Some(existing) = self.timers.get(context) {
            return Err(TimerAlreadyArmed { fired: existing.fired });
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let timeout = self.timeout;
        let expired_context = context.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // Executor gone means the manager shut down
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(StepQueueCommand::TimerExpired {
                    context: expired_context,
                    generation,
                });
            }
        });

        debug!(%context, generation, ?timeout, "TimeoutSupervisor::arm");
        self.timers.insert(
            context.clone(),
            PendingTimer {
                generation,
                abort: task.abort_handle(),
                fired: false,
            },
        );
        Ok(())
    }

    /// Cancel and forget the timer for `context`; no-op if there is none
    pub(crate) fn cancel(&mut self, context: &ExecutionContext) -> bool {
        match self.timers.remove(context) {
            Some(timer) => {
                timer.abort.abort();
                debug!(%context, generation = timer.generation, fired = timer.fired, "TimeoutSupervisor::cancel");
                true
            }
            None => false,
        }
    }

    /// Record expiry of `generation`; false if that timer is no longer live
    pub(crate) fn expire(&mut self, context: &ExecutionContext, generation: u64) -> bool {
        match self.timers.get_mut(context) {
            Some(timer) if timer.generation == generation && !timer.fired => {
                timer.fired = true;
                true
            }
            _ => false,
        }
    }

    /// True from arming until the next cancel, whether or not it has fired
    pub(crate) fn is_outstanding(&self, context: &ExecutionContext) -> bool {
        self.timers.contains_key(context)
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort.abort();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
