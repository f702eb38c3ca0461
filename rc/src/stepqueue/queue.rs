//! Per-context bounded step queues

use std::collections::{HashMap, VecDeque};

use crate::domain::{ExecutionContext, StepRequest};

use super::config::DrainOrder;

/// Bounded queues of pending steps, keyed by execution context
///
/// A context's entry exists only while it holds at least one request.
#[derive(Debug)]
pub(crate) struct StepQueues {
    queues: HashMap<ExecutionContext, VecDeque<StepRequest>>,
    depth: usize,
    order: DrainOrder,
}

impl StepQueues {
    pub(crate) fn new(depth: usize, order: DrainOrder) -> Self {
        Self {
            queues: HashMap::new(),
            depth,
            order,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Change the depth, trimming queues that are now too long
    ///
    /// The most recently queued requests are the ones trimmed. Returns the
    /// number of requests discarded.
    pub(crate) fn set_depth(&mut self, depth: usize) -> usize {
        self.depth = depth;
        let mut trimmed = 0;
        for queue in self.queues.values_mut() {
            while queue.len() > depth {
                queue.pop_back();
                trimmed += 1;
            }
        }
        self.queues.retain(|_, queue| !queue.is_empty());
        trimmed
    }

    /// Append `request`; false if the queue is already full
    pub(crate) fn push(&mut self, context: &ExecutionContext, request: StepRequest) -> bool {
        if self.len(context) >= self.depth {
            return false;
        }
        self.queues.entry(context.clone()).or_default().push_back(request);
        true
    }

    /// Take the next request per the drain order
    pub(crate) fn pop(&mut self, context: &ExecutionContext) -> Option<StepRequest> {
        let queue = self.queues.get_mut(context)?;
        let request = match self.order {
            DrainOrder::Fifo => queue.pop_front(),
            DrainOrder::Lifo => queue.pop_back(),
        };
        if queue.is_empty() {
            self.queues.remove(context);
        }
        request
    }

    /// Drop every request for `context`, returning how many were dropped
    pub(crate) fn flush(&mut self, context: &ExecutionContext) -> usize {
        self.queues.remove(context).map(|q| q.len()).unwrap_or(0)
    }

    pub(crate) fn len(&self, context: &ExecutionContext) -> usize {
        self.queues.get(context).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of contexts with at least one pending request
    pub(crate) fn context_count(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn clear(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SessionId, StepType};
    use proptest::prelude::*;

    fn ctx(id: &str) -> ExecutionContext {
        ExecutionContext::thread(SessionId::new(), id)
    }

    #[test]
    fn test_push_respects_depth() {
        let mut queues = StepQueues::new(2, DrainOrder::Fifo);
        let a = ctx("a");
        assert!(queues.push(&a, StepRequest::source(StepType::Over)));
        assert!(queues.push(&a, StepRequest::source(StepType::Into)));
        assert!(!queues.push(&a, StepRequest::source(StepType::Return)));
        assert_eq!(queues.len(&a), 2);
    }

    #[test]
    fn test_fifo_drain() {
        let mut queues = StepQueues::new(3, DrainOrder::Fifo);
        let a = ctx("a");
        queues.push(&a, StepRequest::source(StepType::Over));
        queues.push(&a, StepRequest::instruction(StepType::Into));

        assert_eq!(queues.pop(&a), Some(StepRequest::source(StepType::Over)));
        assert_eq!(queues.pop(&a), Some(StepRequest::instruction(StepType::Into)));
        assert_eq!(queues.pop(&a), None);
        assert_eq!(queues.context_count(), 0);
    }

    #[test]
    fn test_lifo_drain() {
        let mut queues = StepQueues::new(3, DrainOrder::Lifo);
        let a = ctx("a");
        queues.push(&a, StepRequest::source(StepType::Over));
        queues.push(&a, StepRequest::source(StepType::Return));

        assert_eq!(queues.pop(&a), Some(StepRequest::source(StepType::Return)));
        assert_eq!(queues.pop(&a), Some(StepRequest::source(StepType::Over)));
    }

    #[test]
    fn test_entry_removed_when_empty() {
        let mut queues = StepQueues::new(3, DrainOrder::Fifo);
        let a = ctx("a");
        let b = ctx("b");
        queues.push(&a, StepRequest::source(StepType::Over));
        queues.push(&b, StepRequest::source(StepType::Over));
        assert_eq!(queues.context_count(), 2);

        queues.pop(&a);
        assert_eq!(queues.context_count(), 1);
        assert_eq!(queues.flush(&b), 1);
        assert_eq!(queues.context_count(), 0);
        assert_eq!(queues.flush(&b), 0);
    }

    #[test]
    fn test_zero_depth_disables_queueing() {
        let mut queues = StepQueues::new(0, DrainOrder::Fifo);
        let a = ctx("a");
        assert!(!queues.push(&a, StepRequest::source(StepType::Over)));
        assert_eq!(queues.context_count(), 0);
    }

    #[test]
    fn test_shrinking_depth_trims_newest() {
        let mut queues = StepQueues::new(3, DrainOrder::Fifo);
        let a = ctx("a");
        queues.push(&a, StepRequest::source(StepType::Over));
        queues.push(&a, StepRequest::source(StepType::Into));
        queues.push(&a, StepRequest::source(StepType::Return));

        assert_eq!(queues.set_depth(1), 2);
        assert_eq!(queues.len(&a), 1);
        assert_eq!(queues.pop(&a), Some(StepRequest::source(StepType::Over)));

        assert_eq!(queues.set_depth(0), 0);
        assert_eq!(queues.depth(), 0);
    }

    proptest! {
        #[test]
        fn prop_queue_never_exceeds_depth(depth in 0usize..6, ops in proptest::collection::vec(0u8..3, 0..64)) {
            let mut queues = StepQueues::new(depth, DrainOrder::Fifo);
            let a = ctx("a");
            for op in ops {
                match op {
                    0 | 1 => {
                        let before = queues.len(&a);
                        let accepted = queues.push(&a, StepRequest::source(StepType::Over));
                        prop_assert_eq!(accepted, before < depth);
                    }
                    _ => {
                        queues.pop(&a);
                    }
                }
                prop_assert!(queues.len(&a) <= depth);
            }
        }
    }
}
