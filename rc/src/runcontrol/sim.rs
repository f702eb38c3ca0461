//! SimulatedRunControl - in-memory back end
//!
//! Models a target whose threads are suspended, running or stepping. A step
//! publishes Resumed(Step) straight away and, unless told to hang, publishes
//! Suspended(Step) after the configured latency. Used by the `rc simulate`
//! command and by the integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::error::RunControlError;
use super::traits::{Completion, RunControl, completed, failed};
use crate::config::SimulationConfig;
use crate::domain::{ExecutionContext, StateChangeReason, StepType};
use crate::events::RunControlEvent;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadState {
    Suspended,
    Running,
    Stepping,
}

#[derive(Debug)]
struct SimContext {
    state: ThreadState,
    step_enabled: bool,
    instruction_step_enabled: bool,
    hang_next_step: bool,
    fail_next_command: Option<String>,
    steps: u64,
    instruction_steps: u64,
    // Bumped on every transition so a stale delayed stop is ignored
    generation: u64,
}

impl SimContext {
    fn suspended() -> Self {
        Self {
            state: ThreadState::Suspended,
            step_enabled: true,
            instruction_step_enabled: true,
            hang_next_step: false,
            fail_next_command: None,
            steps: 0,
            instruction_steps: 0,
            generation: 0,
        }
    }
}

/// State shared with the delayed-stop tasks
#[derive(Debug, Default)]
struct Shared {
    contexts: Mutex<HashMap<ExecutionContext, SimContext>>,
    // Held from a state change until its event is published, so events
    // leave in the order the transitions happened
    transitions: Mutex<()>,
}

impl Shared {
    fn contexts(&self) -> MutexGuard<'_, HashMap<ExecutionContext, SimContext>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transitions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a stepping context back to suspended and publish Suspended(Step)
    ///
    /// With `generation` set, only the step that scheduled the stop may finish it.
    fn finish_step(&self, session: &Session, context: &ExecutionContext, generation: Option<u64>) -> bool {
        let _transition = self.transition();
        {
            let mut guard = self.contexts();
            let Some(entry) = guard.get_mut(context) else {
                return false;
            };
            if entry.state != ThreadState::Stepping || generation.is_some_and(|g| g != entry.generation) {
                return false;
            }
            entry.state = ThreadState::Suspended;
            entry.generation += 1;
        }
        debug!(%context, "SimulatedRunControl: step finished");
        session.publish(RunControlEvent::suspended(context.clone(), StateChangeReason::Step));
        true
    }
}

/// In-memory [`RunControl`] back end
///
/// Each command publishes its event before another command can change the
/// same target, so bus handlers must not call commands on the back end that
/// is publishing to them. Queries are fine.
pub struct SimulatedRunControl {
    session: Arc<Session>,
    config: SimulationConfig,
    shared: Arc<Shared>,
}

impl SimulatedRunControl {
    pub fn new(session: Arc<Session>, config: SimulationConfig) -> Self {
        debug!(session_id = %session.id(), ?config, "SimulatedRunControl::new");
        Self {
            session,
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Add a suspended thread and return its context
    pub fn add_thread(&self, id: &str) -> ExecutionContext {
        let context = self.session.thread(id);
        self.shared.contexts().insert(context.clone(), SimContext::suspended());
        info!(%context, "Simulated thread added");
        context
    }

    /// Add a suspended container and return its context
    pub fn add_container(&self, id: &str) -> ExecutionContext {
        let context = self.session.container(id);
        self.shared.contexts().insert(context.clone(), SimContext::suspended());
        info!(%context, "Simulated container added");
        context
    }

    /// Allow or forbid source-level steps on `context`
    pub fn set_step_enabled(&self, context: &ExecutionContext, enabled: bool) {
        if let Some(entry) = self.shared.contexts().get_mut(context) {
            entry.step_enabled = enabled;
        }
    }

    /// Allow or forbid instruction-level steps on `context`
    pub fn set_instruction_step_enabled(&self, context: &ExecutionContext, enabled: bool) {
        if let Some(entry) = self.shared.contexts().get_mut(context) {
            entry.instruction_step_enabled = enabled;
        }
    }

    /// The next step on `context` never finishes on its own
    pub fn hang_next_step(&self, context: &ExecutionContext) {
        if let Some(entry) = self.shared.contexts().get_mut(context) {
            entry.hang_next_step = true;
        }
    }

    /// The next command on `context` fails with `message`
    pub fn fail_next_command(&self, context: &ExecutionContext, message: &str) {
        if let Some(entry) = self.shared.contexts().get_mut(context) {
            entry.fail_next_command = Some(message.to_string());
        }
    }

    /// Finish an in-flight step now, regardless of latency
    pub fn complete_step(&self, context: &ExecutionContext) -> bool {
        self.shared.finish_step(&self.session, context, None)
    }

    /// Stop a running or stepping context at a breakpoint
    pub fn hit_breakpoint(&self, context: &ExecutionContext) -> bool {
        let _transition = self.shared.transition();
        {
            let mut guard = self.shared.contexts();
            let Some(entry) = guard.get_mut(context) else {
                return false;
            };
            if entry.state == ThreadState::Suspended {
                return false;
            }
            entry.state = ThreadState::Suspended;
            entry.generation += 1;
        }
        self.session
            .publish(RunControlEvent::suspended(context.clone(), StateChangeReason::Breakpoint));
        true
    }

    /// Source-level steps issued on `context`
    pub fn steps_taken(&self, context: &ExecutionContext) -> u64 {
        self.shared.contexts().get(context).map(|e| e.steps).unwrap_or(0)
    }

    /// Instruction-level steps issued on `context`
    pub fn instruction_steps_taken(&self, context: &ExecutionContext) -> u64 {
        self.shared.contexts().get(context).map(|e| e.instruction_steps).unwrap_or(0)
    }

    fn state(&self, context: &ExecutionContext) -> Option<ThreadState> {
        self.shared.contexts().get(context).map(|e| e.state)
    }

    fn begin_step(&self, context: &ExecutionContext, step_type: StepType, instruction: bool) -> Completion {
        let _transition = self.shared.transition();
        let (generation, hang) = {
            let mut guard = self.shared.contexts();
            let Some(entry) = guard.get_mut(context) else {
                return failed(RunControlError::UnknownContext(context.clone()));
            };
            if let Some(message) = entry.fail_next_command.take() {
                return failed(RunControlError::Backend(message));
            }
            if context.is_container() {
                return failed(RunControlError::NotSupported {
                    context: context.clone(),
                    reason: "containers cannot step".to_string(),
                });
            }
            if entry.state != ThreadState::Suspended {
                return failed(RunControlError::NotSuspended(context.clone()));
            }
            let enabled = if instruction {
                entry.instruction_step_enabled
            } else {
                entry.step_enabled
            };
            if !enabled {
                return failed(RunControlError::NotSupported {
                    context: context.clone(),
                    reason: format!("{} step disabled", step_type),
                });
            }

            entry.state = ThreadState::Stepping;
            entry.generation += 1;
            if instruction {
                entry.instruction_steps += 1;
            } else {
                entry.steps += 1;
            }
            (entry.generation, std::mem::take(&mut entry.hang_next_step))
        };

        debug!(%context, %step_type, instruction, hang, "SimulatedRunControl: step started");
        self.session
            .publish(RunControlEvent::resumed(context.clone(), StateChangeReason::Step));

        if self.config.auto_complete_steps && !hang {
            let shared = self.shared.clone();
            let session = self.session.clone();
            let context = context.clone();
            let latency = self.config.step_latency();
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                shared.finish_step(&session, &context, Some(generation));
            });
        }

        completed()
    }
}

impl RunControl for SimulatedRunControl {
    fn is_suspended(&self, context: &ExecutionContext) -> bool {
        self.state(context) == Some(ThreadState::Suspended)
    }

    fn is_stepping(&self, context: &ExecutionContext) -> bool {
        self.state(context) == Some(ThreadState::Stepping)
    }

    fn can_resume(&self, context: &ExecutionContext) -> bool {
        self.is_suspended(context)
    }

    fn can_suspend(&self, context: &ExecutionContext) -> bool {
        matches!(self.state(context), Some(ThreadState::Running | ThreadState::Stepping))
    }

    fn can_step(&self, context: &ExecutionContext, _step_type: StepType) -> bool {
        if context.is_container() {
            return false;
        }
        self.shared
            .contexts()
            .get(context)
            .is_some_and(|e| e.state == ThreadState::Suspended && e.step_enabled)
    }

    fn can_instruction_step(&self, context: &ExecutionContext, _step_type: StepType) -> bool {
        if context.is_container() {
            return false;
        }
        self.shared
            .contexts()
            .get(context)
            .is_some_and(|e| e.state == ThreadState::Suspended && e.instruction_step_enabled)
    }

    fn resume(&self, context: &ExecutionContext) -> Completion {
        let _transition = self.shared.transition();
        {
            let mut guard = self.shared.contexts();
            let Some(entry) = guard.get_mut(context) else {
                return failed(RunControlError::UnknownContext(context.clone()));
            };
            if let Some(message) = entry.fail_next_command.take() {
                return failed(RunControlError::Backend(message));
            }
            if entry.state != ThreadState::Suspended {
                return failed(RunControlError::NotSuspended(context.clone()));
            }
            entry.state = ThreadState::Running;
            entry.generation += 1;
        }
        self.session
            .publish(RunControlEvent::resumed(context.clone(), StateChangeReason::UserRequest));
        completed()
    }

    fn suspend(&self, context: &ExecutionContext) -> Completion {
        let _transition = self.shared.transition();
        {
            let mut guard = self.shared.contexts();
            let Some(entry) = guard.get_mut(context) else {
                return failed(RunControlError::UnknownContext(context.clone()));
            };
            if let Some(message) = entry.fail_next_command.take() {
                return failed(RunControlError::Backend(message));
            }
            if entry.state == ThreadState::Suspended {
                return failed(RunControlError::AlreadySuspended(context.clone()));
            }
            entry.state = ThreadState::Suspended;
            entry.generation += 1;
        }
        self.session
            .publish(RunControlEvent::suspended(context.clone(), StateChangeReason::UserRequest));
        completed()
    }

    fn step(&self, context: &ExecutionContext, step_type: StepType) -> Completion {
        self.begin_step(context, step_type, false)
    }

    fn instruction_step(&self, context: &ExecutionContext, step_type: StepType) -> Completion {
        self.begin_step(context, step_type, true)
    }
}
