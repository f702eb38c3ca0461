//! Integration tests for the step queue manager
//!
//! These drive the public API end to end: a session, a back end publishing
//! on the session bus, and the manager reacting to its events.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runcontrol::runcontrol::{completed, failed};
use runcontrol::{
    Completion, DrainOrder, EventKind, ExecutionContext, RunControl, RunControlError, RunControlEvent, Session,
    SimulatedRunControl, SimulationConfig, StateChangeReason, StepQueueConfig, StepQueueManager, StepType,
};

fn manual_sim(session: &Arc<Session>) -> Arc<SimulatedRunControl> {
    Arc::new(SimulatedRunControl::new(
        session.clone(),
        SimulationConfig {
            auto_complete_steps: false,
            ..Default::default()
        },
    ))
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_rapid_steps_queue_behind_in_flight_step() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(
        session.clone(),
        sim.clone(),
        StepQueueConfig {
            queue_depth: 3,
            ..Default::default()
        },
    );

    for _ in 0..3 {
        handle.enqueue_step(&a, StepType::Over).unwrap();
    }
    // One dispatched immediately, two queued
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 2);
    assert_eq!(sim.steps_taken(&a), 1);

    sim.complete_step(&a);
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 1);
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());
    assert_eq!(sim.steps_taken(&a), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_step_times_out_exactly_once() {
    let session = Session::open();
    let timeouts = Arc::new(AtomicUsize::new(0));
    let listener = session.bus().listener();
    let counter = timeouts.clone();
    session.bus().register(listener, EventKind::SteppingTimedOut, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(handle.is_stepping_timed_out(&a).await.unwrap());
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_queue_bounded_by_depth() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());
    let depth = handle.step_queue_depth().await.unwrap();

    for _ in 0..20 {
        handle.enqueue_step(&a, StepType::Over).unwrap();
        assert!(handle.pending_step_count(&a).await.unwrap() <= depth);
    }
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), depth);
}

#[tokio::test]
async fn test_suspended_context_never_queues() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    for expected_steps in 1..=5 {
        assert!(sim.can_step(&a, StepType::Into));
        handle.enqueue_step(&a, StepType::Into).unwrap();
        assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
        assert_eq!(sim.steps_taken(&a), expected_steps);
        sim.complete_step(&a);
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_resets_on_next_suspend() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(handle.is_stepping_timed_out(&a).await.unwrap());

    sim.complete_step(&a);
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());

    // A new step starts with a fresh timer
    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!handle.is_stepping_timed_out(&a).await.unwrap());
}

#[tokio::test]
async fn test_drain_one_per_suspend() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    for _ in 0..4 {
        handle.enqueue_step(&a, StepType::Over).unwrap();
    }
    let mut pending = handle.pending_step_count(&a).await.unwrap();
    assert_eq!(pending, 3);

    while pending > 0 {
        let steps_before = sim.steps_taken(&a);
        sim.complete_step(&a);
        let now = handle.pending_step_count(&a).await.unwrap();
        assert_eq!(now, pending - 1);
        assert_eq!(sim.steps_taken(&a), steps_before + 1);
        pending = now;
    }

    // Queue empty: the final stop leaves the thread suspended
    sim.complete_step(&a);
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
    assert!(sim.is_suspended(&a));
}

#[tokio::test]
async fn test_queue_flushed_when_context_cannot_step() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    for _ in 0..4 {
        handle.enqueue_step(&a, StepType::Return).unwrap();
    }
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 3);

    sim.set_step_enabled(&a, false);
    sim.hit_breakpoint(&a);

    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
    assert_eq!(sim.steps_taken(&a), 1);
}

#[tokio::test]
async fn test_contexts_are_independent() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let b = sim.add_thread("B");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    handle.enqueue_step(&a, StepType::Over).unwrap();
    handle.enqueue_step(&a, StepType::Over).unwrap();
    handle.enqueue_step(&b, StepType::Over).unwrap();

    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 1);
    assert_eq!(handle.pending_step_count(&b).await.unwrap(), 0);

    sim.complete_step(&b);
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 1);
    assert_eq!(sim.steps_taken(&a), 1);
}

#[tokio::test]
async fn test_containers_never_step_or_queue() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let process = sim.add_container("p1");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    assert!(!handle.can_enqueue_step(&process, StepType::Over).await.unwrap());
    handle.enqueue_step(&process, StepType::Over).unwrap();
    assert_eq!(handle.pending_step_count(&process).await.unwrap(), 0);
    assert_eq!(handle.metrics().await.unwrap().dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_completing_back_end_drains_burst() {
    let session = Session::open();
    let sim = Arc::new(SimulatedRunControl::new(
        session.clone(),
        SimulationConfig {
            step_latency_ms: 50,
            auto_complete_steps: true,
        },
    ));
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());

    for _ in 0..6 {
        handle.enqueue_step(&a, StepType::Over).unwrap();
    }
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 3);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
    assert_eq!(sim.steps_taken(&a), 4);
    assert!(sim.is_suspended(&a));

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.dispatched, 4);
    assert_eq!(metrics.dropped, 2);
    assert_eq!(metrics.timeouts, 0);
}

#[tokio::test]
async fn test_fifo_replays_in_press_order() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");
    let handle = StepQueueManager::spawn(
        session.clone(),
        sim.clone(),
        StepQueueConfig {
            drain_order: DrainOrder::Fifo,
            ..Default::default()
        },
    );

    handle.enqueue_step(&a, StepType::Over).unwrap();
    handle.enqueue_instruction_step(&a, StepType::Over).unwrap();
    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 2);

    sim.complete_step(&a);
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 1);
    assert_eq!(sim.instruction_steps_taken(&a), 1);
    assert_eq!(sim.steps_taken(&a), 1);
}

// =============================================================================
// Back end seam
// =============================================================================

/// Back end that reports a fixed stepping state and fails every step
struct FailingBackEnd {
    stepping: Mutex<HashSet<ExecutionContext>>,
    attempts: AtomicUsize,
}

impl FailingBackEnd {
    fn new() -> Self {
        Self {
            stepping: Mutex::new(HashSet::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    fn set_stepping(&self, context: &ExecutionContext, stepping: bool) {
        let mut guard = self.stepping.lock().unwrap();
        if stepping {
            guard.insert(context.clone());
        } else {
            guard.remove(context);
        }
    }
}

impl RunControl for FailingBackEnd {
    fn is_suspended(&self, context: &ExecutionContext) -> bool {
        !self.is_stepping(context)
    }

    fn is_stepping(&self, context: &ExecutionContext) -> bool {
        self.stepping.lock().unwrap().contains(context)
    }

    fn can_resume(&self, context: &ExecutionContext) -> bool {
        self.is_suspended(context)
    }

    fn can_suspend(&self, context: &ExecutionContext) -> bool {
        self.is_stepping(context)
    }

    fn can_step(&self, context: &ExecutionContext, _step_type: StepType) -> bool {
        self.is_suspended(context)
    }

    fn can_instruction_step(&self, context: &ExecutionContext, _step_type: StepType) -> bool {
        self.is_suspended(context)
    }

    fn resume(&self, _context: &ExecutionContext) -> Completion {
        completed()
    }

    fn suspend(&self, _context: &ExecutionContext) -> Completion {
        completed()
    }

    fn step(&self, _context: &ExecutionContext, _step_type: StepType) -> Completion {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        failed(RunControlError::Backend("connection lost".to_string()))
    }

    fn instruction_step(&self, context: &ExecutionContext, step_type: StepType) -> Completion {
        self.step(context, step_type)
    }
}

#[tokio::test]
async fn test_failed_step_not_retried_and_queue_left_alone() {
    let session = Session::open();
    let backend = Arc::new(FailingBackEnd::new());
    let a = session.thread("A");
    let handle = StepQueueManager::spawn(session.clone(), backend.clone(), StepQueueConfig::default());

    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);

    // Mid-step: requests queue, and a failure elsewhere leaves them queued
    backend.set_stepping(&a, true);
    handle.enqueue_step(&a, StepType::Over).unwrap();
    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 2);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);

    // Stop: one queued request is issued (and fails), the other stays
    backend.set_stepping(&a, false);
    session.publish(RunControlEvent::suspended(a.clone(), StateChangeReason::Step));
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 1);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_manager_teardown_unregisters_handlers() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let before = session.bus().handler_count();

    let handle = StepQueueManager::spawn(session.clone(), sim, StepQueueConfig::default());
    assert_eq!(handle.step_queue_depth().await.unwrap(), 3);
    assert_eq!(session.bus().handler_count(), before + 3);

    handle.shutdown().unwrap();
    while !handle.is_closed() {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.bus().handler_count(), before);
    assert!(handle.pending_step_count(&session.thread("A")).await.is_err());
}

#[tokio::test]
async fn test_sessions_do_not_share_state() {
    let first = Session::open();
    let second = Session::open();
    let sim_first = manual_sim(&first);
    let sim_second = manual_sim(&second);
    let a1 = sim_first.add_thread("A");
    let a2 = sim_second.add_thread("A");
    assert_ne!(a1, a2);

    let h1 = StepQueueManager::spawn(first.clone(), sim_first.clone(), StepQueueConfig::default());
    let h2 = StepQueueManager::spawn(second.clone(), sim_second.clone(), StepQueueConfig::default());
    h2.set_step_queue_depth(1).unwrap();

    for _ in 0..4 {
        h1.enqueue_step(&a1, StepType::Over).unwrap();
        h2.enqueue_step(&a2, StepType::Over).unwrap();
    }
    assert_eq!(h1.pending_step_count(&a1).await.unwrap(), 3);
    assert_eq!(h2.pending_step_count(&a2).await.unwrap(), 1);

    // Stopping the first session's thread does not touch the second
    sim_first.complete_step(&a1);
    assert_eq!(h1.pending_step_count(&a1).await.unwrap(), 2);
    assert_eq!(h2.pending_step_count(&a2).await.unwrap(), 1);
}

// =============================================================================
// Concurrent back end
// =============================================================================

/// Log writer that stalls on the simulated back end's step-finished line,
/// which sits between its state change and the Suspended it publishes
struct StallOnStepFinished;

impl io::Write for StallOnStepFinished {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if String::from_utf8_lossy(buf).contains("step finished") {
            std::thread::sleep(Duration::from_millis(300));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_racing_a_step_keeps_event_order() {
    let session = Session::open();
    let sim = manual_sim(&session);
    let a = sim.add_thread("A");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener = session.bus().listener();
    for kind in [EventKind::Suspended, EventKind::Resumed] {
        let seen = seen.clone();
        session.bus().register(listener, kind, move |event| {
            seen.lock().unwrap().push(event.kind());
        });
    }

    let handle = StepQueueManager::spawn(session.clone(), sim.clone(), StepQueueConfig::default());
    handle.enqueue_step(&a, StepType::Over).unwrap();
    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
    assert_eq!(handle.metrics().await.unwrap().active_timers, 1);

    let stopper = {
        let sim = sim.clone();
        let a = a.clone();
        std::thread::spawn(move || {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(|| StallOnStepFinished)
                .finish();
            tracing::subscriber::with_default(subscriber, || sim.complete_step(&a))
        })
    };

    // Press again while the stop is still on its way to the bus
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.enqueue_step(&a, StepType::Over).unwrap();

    let stopped = tokio::task::spawn_blocking(move || stopper.join().unwrap())
        .await
        .unwrap();
    assert!(stopped);

    assert_eq!(handle.pending_step_count(&a).await.unwrap(), 0);
    assert_eq!(sim.steps_taken(&a), 2);
    assert!(sim.is_stepping(&a));

    let metrics = handle.metrics().await.unwrap();
    assert_eq!(metrics.protocol_violations, 0);
    assert_eq!(metrics.dispatched, 2);
    assert_eq!(metrics.active_timers, 1);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![EventKind::Resumed, EventKind::Suspended, EventKind::Resumed]
    );
}
