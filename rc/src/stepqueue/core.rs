//! Main step queue manager task implementation

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::StepQueueConfig;
use super::handle::StepQueueHandle;
use super::messages::{StepQueueCommand, StepQueueMetrics};
use super::queue::StepQueues;
use super::timer::TimeoutSupervisor;
use crate::domain::{ExecutionContext, StateChangeReason, StepRequest, StepType};
use crate::events::{EventKind, Registration, RunControlEvent};
use crate::runcontrol::RunControl;
use crate::session::Session;

/// Queues step requests per execution context and re-issues them as the
/// back end stops
///
/// All state lives in this struct and is touched only by [`run`](Self::run),
/// one command at a time. Callers and the session bus feed the same channel,
/// so an event and the commands around it are handled in arrival order.
pub struct StepQueueManager {
    session: Arc<Session>,
    run_control: Arc<dyn RunControl>,
    queues: StepQueues,
    timed_out: HashSet<ExecutionContext>,
    supervisor: TimeoutSupervisor,
    metrics: StepQueueMetrics,
    // Strong senders live in the bus handlers and in handles only
    weak_tx: mpsc::WeakUnboundedSender<StepQueueCommand>,
    rx: mpsc::UnboundedReceiver<StepQueueCommand>,
    _registration: Registration,
}

impl StepQueueManager {
    /// Create a manager and register its handlers on the session bus
    ///
    /// Events published before [`run`](Self::run) starts are buffered.
    pub fn new(session: Arc<Session>, run_control: Arc<dyn RunControl>, config: StepQueueConfig) -> Self {
        debug!(session_id = %session.id(), ?config, "StepQueueManager::new");
        let (tx, rx) = mpsc::unbounded_channel();

        let bus = session.bus().clone();
        let listener = bus.listener();
        for kind in EventKind::ALL {
            let tx = tx.clone();
            bus.register(listener, kind, move |event| {
                let _ = tx.send(StepQueueCommand::Event(event.clone()));
            });
        }

        Self {
            run_control,
            queues: StepQueues::new(config.queue_depth, config.drain_order),
            timed_out: HashSet::new(),
            supervisor: TimeoutSupervisor::new(config.stepping_timeout()),
            metrics: StepQueueMetrics::default(),
            weak_tx: tx.downgrade(),
            rx,
            _registration: Registration::new(bus, listener),
            session,
        }
    }

    /// Create, register and start a manager, returning its handle
    pub fn spawn(session: Arc<Session>, run_control: Arc<dyn RunControl>, config: StepQueueConfig) -> StepQueueHandle {
        let manager = Self::new(session, run_control, config);
        let handle = manager.handle();
        tokio::spawn(manager.run());
        handle
    }

    /// Get a handle for submitting work
    ///
    /// The handle is already closed if the session was closed before the
    /// manager started.
    pub fn handle(&self) -> StepQueueHandle {
        match self.weak_tx.upgrade() {
            Some(tx) => StepQueueHandle::new(tx),
            None => StepQueueHandle::new(mpsc::unbounded_channel().0),
        }
    }

    /// Run the manager's executor
    ///
    /// Consumes the manager and runs until shutdown is requested or every
    /// sender (handles and bus handlers) is gone.
    pub async fn run(mut self) {
        info!(session_id = %self.session.id(), "StepQueueManager started");

        while let Some(command) = self.rx.recv().await {
            match command {
                StepQueueCommand::Enqueue { context, request } => {
                    self.enqueue(&context, request);
                }

                StepQueueCommand::CanEnqueue {
                    context,
                    step_type,
                    instruction,
                    reply,
                } => {
                    let _ = reply.send(self.can_enqueue(&context, step_type, instruction));
                }

                StepQueueCommand::PendingCount { context, reply } => {
                    let _ = reply.send(self.queues.len(&context));
                }

                StepQueueCommand::IsTimedOut { context, reply } => {
                    let _ = reply.send(self.timed_out.contains(&context));
                }

                StepQueueCommand::SetDepth { depth } => {
                    let trimmed = self.queues.set_depth(depth);
                    self.metrics.dropped += trimmed as u64;
                    debug!(depth, trimmed, "Step queue depth changed");
                }

                StepQueueCommand::GetDepth { reply } => {
                    let _ = reply.send(self.queues.depth());
                }

                StepQueueCommand::Event(event) => match event {
                    RunControlEvent::Suspended { context, reason } => self.on_suspended(&context, reason),
                    RunControlEvent::Resumed { context, reason } => self.on_resumed(&context, reason),
                    RunControlEvent::SteppingTimedOut { context } => self.on_stepping_timed_out(&context),
                },

                StepQueueCommand::TimerExpired { context, generation } => {
                    self.on_timer_expired(&context, generation);
                }

                StepQueueCommand::GetMetrics { reply } => {
                    let mut metrics = self.metrics.clone();
                    metrics.queued_contexts = self.queues.context_count();
                    metrics.active_timers = self.supervisor.len();
                    let _ = reply.send(metrics);
                }

                StepQueueCommand::Shutdown => {
                    info!(session_id = %self.session.id(), "StepQueueManager shutting down");
                    break;
                }
            }
        }

        self.queues.clear();
        self.supervisor.cancel_all();
        self.timed_out.clear();
        info!(session_id = %self.session.id(), "StepQueueManager stopped");
    }

    fn can_step_now(&self, context: &ExecutionContext, step_type: StepType, instruction: bool) -> bool {
        if instruction {
            self.run_control.can_instruction_step(context, step_type)
        } else {
            self.run_control.can_step(context, step_type)
        }
    }

    fn can_enqueue(&self, context: &ExecutionContext, step_type: StepType, instruction: bool) -> bool {
        (self.run_control.is_suspended(context) && self.can_step_now(context, step_type, instruction))
            || (self.run_control.is_stepping(context) && !self.timed_out.contains(context))
    }

    fn enqueue(&mut self, context: &ExecutionContext, request: StepRequest) {
        if self.can_step_now(context, request.step_type, request.instruction) {
            self.dispatch(context, request);
            return;
        }

        if !self.can_enqueue(context, request.step_type, request.instruction) {
            self.metrics.dropped += 1;
            debug!(%context, ?request, "Context cannot step, dropping request");
            return;
        }

        if self.queues.push(context, request) {
            self.metrics.queued += 1;
            debug!(%context, ?request, pending = self.queues.len(context), "Step queued");
        } else {
            self.metrics.dropped += 1;
            debug!(%context, ?request, depth = self.queues.depth(), "Step queue full, dropping request");
        }
    }

    /// Forward to the run-control service; completion is only logged
    fn dispatch(&mut self, context: &ExecutionContext, request: StepRequest) {
        debug!(%context, ?request, "Dispatching step");
        let completion = if request.instruction {
            self.run_control.instruction_step(context, request.step_type)
        } else {
            self.run_control.step(context, request.step_type)
        };
        self.metrics.dispatched += 1;

        let context = context.clone();
        tokio::spawn(async move {
            if let Err(e) = completion.await {
                warn!(%context, ?request, error = %e, "Step failed");
            }
        });
    }

    fn on_suspended(&mut self, context: &ExecutionContext, reason: StateChangeReason) {
        debug!(%context, %reason, "Suspended");
        self.timed_out.remove(context);
        self.supervisor.cancel(context);

        let Some(request) = self.queues.pop(context) else {
            return;
        };

        if self.can_step_now(context, request.step_type, request.instruction) {
            self.dispatch(context, request);
        } else {
            let flushed = 1 + self.queues.flush(context);
            self.metrics.flushed += flushed as u64;
            info!(%context, %reason, flushed, "Context can no longer step, discarding queued steps");
        }
    }

    fn on_resumed(&mut self, context: &ExecutionContext, reason: StateChangeReason) {
        debug!(%context, %reason, "Resumed");
        if reason != StateChangeReason::Step {
            return;
        }

        let armed = self.supervisor.arm(context, self.weak_tx.clone());
        match &armed {
            Ok(()) => {
                self.timed_out.remove(context);
            }
            Err(existing) => {
                // The outstanding timer and its flag stay as they are
                self.metrics.protocol_violations += 1;
                error!(
                    %context,
                    fired = existing.fired,
                    "Protocol violation: Resumed(Step) without an intervening Suspended"
                );
            }
        }
        debug_assert!(
            armed.is_ok(),
            "Resumed(Step) for {} while a stepping timer is already armed",
            context
        );
    }

    fn on_timer_expired(&mut self, context: &ExecutionContext, generation: u64) {
        if !self.supervisor.expire(context, generation) {
            debug!(%context, generation, "Stale stepping timer ignored");
            return;
        }
        if !self.session.is_active() {
            debug!(%context, "Session closed, not publishing stepping timeout");
            return;
        }

        self.metrics.timeouts += 1;
        warn!(%context, "Stepping timed out");
        self.session.publish(RunControlEvent::stepping_timed_out(context.clone()));
    }

    fn on_stepping_timed_out(&mut self, context: &ExecutionContext) {
        // Late delivery after a Suspended must not resurrect the flag
        if self.supervisor.is_outstanding(context) {
            self.timed_out.insert(context.clone());
        } else {
            debug!(%context, "SteppingTimedOut for a context no longer stepping, ignored");
        }
    }
}
