//! StepQueueHandle - client interface for UI and action code

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{StepQueueCommand, StepQueueError, StepQueueMetrics, StepQueueResult};
use crate::domain::{ExecutionContext, StepRequest, StepType};

/// Handle for submitting work to a running step queue manager
///
/// Cheap to clone. Enqueue and configuration calls are fire-and-forget and
/// never block; queries wait for the manager's executor to answer.
#[derive(Clone)]
pub struct StepQueueHandle {
    tx: mpsc::UnboundedSender<StepQueueCommand>,
}

impl StepQueueHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<StepQueueCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: StepQueueCommand) -> StepQueueResult<()> {
        self.tx.send(command).map_err(|_| StepQueueError::Closed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StepQueueCommand) -> StepQueueResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx))?;
        reply_rx.await.map_err(|_| StepQueueError::NoReply)
    }

    /// Step `context` now if it is suspended, otherwise queue the step
    pub fn enqueue_step(&self, context: &ExecutionContext, step_type: StepType) -> StepQueueResult<()> {
        debug!(%context, %step_type, "StepQueueHandle::enqueue_step");
        self.send(StepQueueCommand::Enqueue {
            context: context.clone(),
            request: StepRequest::source(step_type),
        })
    }

    /// Instruction-level counterpart of [`enqueue_step`](Self::enqueue_step)
    pub fn enqueue_instruction_step(&self, context: &ExecutionContext, step_type: StepType) -> StepQueueResult<()> {
        debug!(%context, %step_type, "StepQueueHandle::enqueue_instruction_step");
        self.send(StepQueueCommand::Enqueue {
            context: context.clone(),
            request: StepRequest::instruction(step_type),
        })
    }

    /// Whether a step would be executed or queued rather than ignored
    pub async fn can_enqueue_step(&self, context: &ExecutionContext, step_type: StepType) -> StepQueueResult<bool> {
        self.request(|reply| StepQueueCommand::CanEnqueue {
            context: context.clone(),
            step_type,
            instruction: false,
            reply,
        })
        .await
    }

    pub async fn can_enqueue_instruction_step(
        &self,
        context: &ExecutionContext,
        step_type: StepType,
    ) -> StepQueueResult<bool> {
        self.request(|reply| StepQueueCommand::CanEnqueue {
            context: context.clone(),
            step_type,
            instruction: true,
            reply,
        })
        .await
    }

    /// Number of steps waiting for `context` to stop
    pub async fn pending_step_count(&self, context: &ExecutionContext) -> StepQueueResult<usize> {
        self.request(|reply| StepQueueCommand::PendingCount {
            context: context.clone(),
            reply,
        })
        .await
    }

    /// Whether the step in flight on `context` has exceeded the stepping timeout
    pub async fn is_stepping_timed_out(&self, context: &ExecutionContext) -> StepQueueResult<bool> {
        self.request(|reply| StepQueueCommand::IsTimedOut {
            context: context.clone(),
            reply,
        })
        .await
    }

    /// Change the per-context queue depth; longer queues are trimmed
    pub fn set_step_queue_depth(&self, depth: usize) -> StepQueueResult<()> {
        debug!(depth, "StepQueueHandle::set_step_queue_depth");
        self.send(StepQueueCommand::SetDepth { depth })
    }

    pub async fn step_queue_depth(&self) -> StepQueueResult<usize> {
        self.request(|reply| StepQueueCommand::GetDepth { reply }).await
    }

    pub async fn metrics(&self) -> StepQueueResult<StepQueueMetrics> {
        self.request(|reply| StepQueueCommand::GetMetrics { reply }).await
    }

    /// Ask the manager to stop; queued steps and timers are discarded
    pub fn shutdown(&self) -> StepQueueResult<()> {
        debug!("StepQueueHandle::shutdown");
        self.send(StepQueueCommand::Shutdown)
    }

    /// True once the manager's executor has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_handle_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = StepQueueHandle::new(tx);
        assert!(handle.is_closed());
        assert_eq!(handle.shutdown(), Err(StepQueueError::Closed));
        assert_eq!(handle.step_queue_depth().await, Err(StepQueueError::Closed));
    }

    #[tokio::test]
    async fn test_dropped_reply_reports_no_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StepQueueHandle::new(tx);

        let responder = tokio::spawn(async move {
            // Drop the request, reply sender included
            let _ = rx.recv().await;
        });

        assert_eq!(handle.step_queue_depth().await, Err(StepQueueError::NoReply));
        responder.await.unwrap();
    }
}
