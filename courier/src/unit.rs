//! # Work Units
//!
//! A work unit carries one action's pending input through the pool and back.
//! At most one unit exists per action id; a repeated request for the same id
//! is folded into the existing unit instead of queueing another one.
//!
//! ## Key Concepts
//! - **Pending input**: the latest requested input. A newer, different input
//!   replaces it and bumps the unit's generation.
//! - **Generation**: an atomic counter the running invocation's
//!   [`CancellationToken`] compares against, so the function learns that its
//!   input is stale.
//! - **Retry loop**: when an invocation finishes with a superseded input, the
//!   unit immediately invokes again with the new input on the same worker.
//!
//! ## Design Principles
//! - One mutex guards every mutable field; the generation is bumped while that
//!   mutex is held, so the completion check can never miss a late input
//! - User code never runs with the mutex held

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use courier_api::{ActionError, ActionId, ActionKind, BoxedPayload, CancellationToken};

use crate::error::{lock, panic_message};
use crate::pool::Task;
use crate::record::{ActionRecord, Outcome};

/// Where a unit is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnitPhase {
    /// Submitted to the pool, not yet picked up.
    Queued,
    /// A worker is invoking the function; includes retries.
    Running,
    /// Output stored, waiting for delivery on the owner thread.
    Completed,
    /// Delivered or force-closed; never runs again.
    Closed,
}

/// What `offer` did with a new input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Equal to the pending input; nothing changed.
    Unchanged,
    /// Replaced the pending input of a queued or running unit.
    Superseded,
    /// Replaced the input of a completed unit; the unit must be submitted
    /// again.
    Rearmed,
    /// The unit is closed and ignores input.
    Rejected,
}

struct UnitState {
    phase: UnitPhase,
    input: BoxedPayload,
    output: Option<Outcome>,
    worker: Option<String>,
    attempts: u32,
}

pub(crate) struct WorkUnit {
    id: ActionId,
    record: Arc<dyn ActionRecord>,
    generation: Arc<AtomicU64>,
    interrupted: Arc<AtomicBool>,
    state: Mutex<UnitState>,
}

impl WorkUnit {
    pub(crate) fn new(record: Arc<dyn ActionRecord>, input: BoxedPayload) -> Self {
        Self {
            id: record.id(),
            record,
            generation: Arc::new(AtomicU64::new(0)),
            interrupted: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(UnitState {
                phase: UnitPhase::Queued,
                input,
                output: None,
                worker: None,
                attempts: 0,
            }),
        }
    }

    pub(crate) fn id(&self) -> ActionId {
        self.id
    }

    pub(crate) fn kind(&self) -> ActionKind {
        self.record.kind()
    }

    pub(crate) fn record(&self) -> &Arc<dyn ActionRecord> {
        &self.record
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> UnitPhase {
        lock(&self.state).phase
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invocations started so far, retries included.
    pub(crate) fn attempts(&self) -> u32 {
        lock(&self.state).attempts
    }

    /// Name of the worker currently bound to the unit.
    #[cfg(test)]
    pub(crate) fn worker(&self) -> Option<String> {
        lock(&self.state).worker.clone()
    }

    /// Copy of the pending input.
    pub(crate) fn pending_input(&self) -> BoxedPayload {
        lock(&self.state).input.clone_payload()
    }

    /// Folds a new request into this unit.
    pub(crate) fn offer(&self, input: BoxedPayload) -> Offer {
        let mut state = lock(&self.state);
        if state.phase == UnitPhase::Closed {
            return Offer::Rejected;
        }
        if state.input.eq_payload(&*input) {
            return Offer::Unchanged;
        }

        state.input = input;
        self.generation.fetch_add(1, Ordering::AcqRel);

        if state.phase == UnitPhase::Completed {
            state.output = None;
            state.phase = UnitPhase::Queued;
            Offer::Rearmed
        } else {
            Offer::Superseded
        }
    }

    /// Invokes the function until it completes with an input that was not
    /// superseded meanwhile.
    pub(crate) fn run(&self) {
        let span = crate::unit_span!(self.id, self.record.kind());
        let _guard = span.enter();

        loop {
            let (input, started) = {
                let mut state = lock(&self.state);
                if state.phase == UnitPhase::Closed {
                    return;
                }
                state.phase = UnitPhase::Running;
                state.attempts += 1;
                (state.input.clone_payload(), self.generation.load(Ordering::Acquire))
            };

            let token = CancellationToken::new(self.generation.clone(), started, self.interrupted.clone());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.record.invoke(input, &token)))
                .unwrap_or_else(|payload| Err(ActionError::Panicked(panic_message(&*payload))));

            let mut state = lock(&self.state);
            if state.phase == UnitPhase::Closed {
                return;
            }
            if !self.interrupted.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) != started {
                crate::log_unit!(self.id, "superseded", generation = started, attempts = state.attempts);
                continue;
            }

            crate::log_unit!(self.id, "completed", generation = started, ok = outcome.is_ok());
            state.output = Some(outcome);
            state.phase = UnitPhase::Completed;
            return;
        }
    }

    /// Records a failure of the engine itself around `run`, so the unit
    /// still completes and is delivered.
    pub(crate) fn fail(&self, message: String) {
        let mut state = lock(&self.state);
        if matches!(state.phase, UnitPhase::Queued | UnitPhase::Running) {
            state.output = Some(Err(ActionError::Panicked(message)));
            state.phase = UnitPhase::Completed;
        }
    }

    pub(crate) fn bind(&self, worker: &str) {
        lock(&self.state).worker = Some(worker.to_string());
    }

    /// Clears the worker binding if `worker` still owns it.
    pub(crate) fn unbind(&self, worker: &str) {
        let mut state = lock(&self.state);
        if state.worker.as_deref() == Some(worker)
            && matches!(state.phase, UnitPhase::Completed | UnitPhase::Closed)
        {
            state.worker = None;
        }
    }

    /// Takes the output of a completed unit and closes it. `None` when the
    /// unit has not completed, for example because it was re-armed.
    pub(crate) fn take_output(&self) -> Option<Outcome> {
        let mut state = lock(&self.state);
        if state.phase != UnitPhase::Completed {
            return None;
        }
        state.phase = UnitPhase::Closed;
        state.output.take()
    }

    /// Asks a running invocation to stop; its result will not be retried.
    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Closes the unit without delivering anything.
    pub(crate) fn close(&self) {
        self.interrupt();
        let mut state = lock(&self.state);
        state.phase = UnitPhase::Closed;
        state.output = None;
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("WorkUnit")
            .field("id", &self.id)
            .field("kind", &self.record.kind())
            .field("phase", &state.phase)
            .field("input", &state.input)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("worker", &state.worker)
            .field("attempts", &state.attempts)
            .finish()
    }
}

impl Task for WorkUnit {
    fn run(&self) {
        WorkUnit::run(self)
    }

    fn interrupt(&self) {
        WorkUnit::interrupt(self)
    }
}
