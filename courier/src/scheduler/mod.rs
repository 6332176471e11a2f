//! # Scheduler
//!
//! The scheduler is the root of the engine. It owns the table of registered
//! action records, the map of in-flight work units and the worker pool, and
//! it is bound to the thread that built it (the owner thread).
//!
//! ## Key Concepts
//! - **Owner thread**: the only thread that touches the in-flight map and the
//!   only thread on which callbacks run. `apply` from any other thread is
//!   trampolined through the [`OwnerExecutor`].
//! - **Single flight**: at most one work unit per action id. A new request
//!   for a running action replaces the pending input instead of queueing.
//! - **Snapshot**: `backup()` captures the pending inputs of in-flight
//!   actions; a builder restored from it re-applies them.
//!
//! ## Design Principles
//! - `apply` and `close` never fail; misuse (unknown id, wrong input type)
//!   panics at the call site
//! - Locks are released before any callback runs, so callbacks may call back
//!   into the scheduler
//! - Closing is terminal and idempotent; nothing is delivered afterwards
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use courier::{ActionId, CancellationToken, MainLoop, Scheduler};
//!
//! let main_loop = MainLoop::new();
//! let delivered = Arc::new(Mutex::new(Vec::new()));
//! let sink = delivered.clone();
//!
//! let scheduler = Scheduler::serial()
//!     .executor(main_loop.handle())
//!     .get(
//!         |s: String, _: &CancellationToken| Ok(Some(s.len())),
//!         move |result| sink.lock().unwrap().push(result.unwrap()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! scheduler.apply(ActionId(0), String::from("abcd"));
//! assert!(main_loop.run_until(Duration::from_secs(5), || !delivered.lock().unwrap().is_empty()));
//! assert_eq!(*delivered.lock().unwrap(), vec![Some(4)]);
//! ```

mod builder;
mod hooks;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use courier_api::{ActionId, ActionKind, BoxedPayload, OwnerExecutor, Payload, Snapshot};
use uuid::Uuid;

use crate::config::PoolMode;
use crate::error::{lock, PoolError};
use crate::pool::WorkerPool;
use crate::record::ActionRecord;
use crate::unit::{Offer, WorkUnit};

pub use builder::SchedulerBuilder;

/// Handle to a scheduler. Clones share the same scheduler; dropping the last
/// handle closes it.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

pub(crate) struct SchedulerCore {
    id: Uuid,
    owner: ThreadId,
    mode: PoolMode,
    records: Vec<Arc<dyn ActionRecord>>,
    executor: Option<Arc<dyn OwnerExecutor>>,
    pool: Option<WorkerPool<Arc<WorkUnit>>>,
    in_flight: Mutex<HashMap<ActionId, Arc<WorkUnit>>>,
    closed: Arc<AtomicBool>,
    weak: Weak<SchedulerCore>,
}

impl Scheduler {
    pub fn builder(mode: PoolMode) -> SchedulerBuilder {
        SchedulerBuilder::new(mode)
    }

    /// Builder for a scheduler with a single worker thread.
    pub fn serial() -> SchedulerBuilder {
        SchedulerBuilder::new(PoolMode::Serial)
    }

    /// Builder for a scheduler with a CPU-sized pool.
    pub fn parallel() -> SchedulerBuilder {
        SchedulerBuilder::new(PoolMode::Parallel)
    }

    /// Requests `id` with `input`.
    ///
    /// Callable from any thread. If the action is already in flight with a
    /// different input, the new input supersedes it and only the latest
    /// result is delivered; an equal input is ignored.
    ///
    /// # Panics
    /// If no action is registered under `id`, or the action expects a
    /// different input type.
    pub fn apply<I: Payload>(&self, id: ActionId, input: I) {
        self.core.dispatch(id, Box::new(input));
    }

    /// Requests an action that takes no input.
    pub fn apply_void(&self, id: ActionId) {
        self.core.dispatch(id, Box::new(()));
    }

    /// Requests `id` with an already boxed input.
    pub fn apply_boxed(&self, id: ActionId, input: BoxedPayload) {
        self.core.dispatch(id, input);
    }

    /// Pending inputs of every in-flight action.
    ///
    /// # Panics
    /// When called off the owner thread of a scheduler with an executor.
    /// Synchronous schedulers have no owner affinity and never hold work in
    /// flight, so any thread gets an empty snapshot.
    pub fn backup(&self) -> Snapshot {
        self.core.backup()
    }

    /// Stops the pool and drops all in-flight work without delivering it.
    /// Idempotent; callable from any thread.
    pub fn close(&self) {
        self.core.close();
    }

    // --- Diagnostics ---

    /// Diagnostic id, unique per scheduler.
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn mode(&self) -> PoolMode {
        self.core.mode
    }

    /// Whether actions run inline on the calling thread.
    pub fn is_synchronous(&self) -> bool {
        self.core.executor.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Whether the calling thread is the owner thread.
    pub fn is_owner(&self) -> bool {
        self.core.is_owner()
    }

    pub fn action_count(&self) -> usize {
        self.core.records.len()
    }

    pub fn kind(&self, id: ActionId) -> Option<ActionKind> {
        self.core.records.get(id.index()).map(|record| record.kind())
    }

    /// Number of in-flight actions. Owner thread only.
    pub fn in_flight_len(&self) -> usize {
        self.core.assert_owner();
        lock(&self.core.in_flight).len()
    }

    /// Owner thread only.
    pub fn is_in_flight(&self, id: ActionId) -> bool {
        self.core.assert_owner();
        lock(&self.core.in_flight).contains_key(&id)
    }

    /// Live worker threads; zero in synchronous mode.
    pub fn worker_count(&self) -> usize {
        self.core.pool.as_ref().map_or(0, |pool| pool.live_workers())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.core.id)
            .field("mode", &self.core.mode)
            .field("actions", &self.core.records.len())
            .field("synchronous", &self.core.executor.is_none())
            .field("closed", &self.core.is_closed())
            .finish()
    }
}

impl SchedulerCore {
    fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn assert_owner(&self) {
        debug_assert!(
            self.executor.is_none() || self.is_owner(),
            "in-flight map accessed off the owner thread"
        );
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn record(&self, id: ActionId) -> &Arc<dyn ActionRecord> {
        self.records
            .get(id.index())
            .unwrap_or_else(|| panic!("no action registered for {id}"))
    }

    fn dispatch(&self, id: ActionId, input: BoxedPayload) {
        let record = self.record(id);
        assert!(
            record.accepts(&*input),
            "{id} expects {}, got {}",
            record.input_type(),
            input.payload_type()
        );

        if self.is_closed() {
            crate::log_unit!(id, "dropped", reason = "scheduler closed");
            return;
        }

        match &self.executor {
            None => self.run_inline(id, input),
            Some(_) if self.is_owner() => self.apply_on_owner(id, input),
            Some(executor) => {
                let core = self.weak.clone();
                executor.execute(Box::new(move || {
                    if let Some(core) = core.upgrade() {
                        core.apply_on_owner(id, input);
                    }
                }));
            }
        }
    }

    fn apply_on_owner(&self, id: ActionId, input: BoxedPayload) {
        self.assert_owner();

        // `close()` flips the flag under this lock, so a unit inserted here
        // is always seen by its drain.
        let (unit, offered) = {
            let mut in_flight = lock(&self.in_flight);
            if self.is_closed() {
                crate::log_unit!(id, "dropped", reason = "scheduler closed");
                return;
            }
            match in_flight.get(&id) {
                Some(unit) => (Arc::clone(unit), Some(input)),
                None => {
                    let unit = Arc::new(WorkUnit::new(Arc::clone(self.record(id)), input));
                    in_flight.insert(id, Arc::clone(&unit));
                    (unit, None)
                }
            }
        };

        let Some(input) = offered else {
            crate::log_unit!(id, "queued", kind = %unit.kind());
            self.submit(unit);
            return;
        };
        match unit.offer(input) {
            Offer::Unchanged => crate::log_unit!(id, "coalesced"),
            Offer::Superseded => crate::log_unit!(id, "superseded", generation = unit.generation()),
            Offer::Rearmed => {
                crate::log_unit!(id, "rearmed", generation = unit.generation());
                self.submit(unit);
            }
            Offer::Rejected => crate::log_unit!(id, "dropped", reason = "unit closed"),
        }
    }

    fn submit(&self, unit: Arc<WorkUnit>) {
        let Some(pool) = &self.pool else {
            return;
        };
        let id = unit.id();
        match pool.submit(unit) {
            Ok(()) => {}
            Err(PoolError::Stopped) => crate::log_unit!(id, "dropped", reason = "pool stopped"),
            Err(error) => panic!("{} cannot run {id}: {error}", pool.name()),
        }
    }

    /// Synchronous mode: run on the calling thread and deliver at once.
    fn run_inline(&self, id: ActionId, input: BoxedPayload) {
        let unit = WorkUnit::new(Arc::clone(self.record(id)), input);
        unit.run();
        if let Some(outcome) = unit.take_output() {
            crate::log_unit!(id, "delivered", attempts = unit.attempts());
            unit.record().deliver(outcome);
        }
    }

    /// Delivers a unit handed back by a worker. Stale hand-backs, from units
    /// that were re-armed or replaced, are ignored.
    pub(crate) fn finish(&self, unit: &Arc<WorkUnit>) {
        self.assert_owner();
        if self.is_closed() {
            return;
        }

        let id = unit.id();
        let outcome = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&id) {
                Some(current) if Arc::ptr_eq(current, unit) => {}
                _ => {
                    crate::log_unit!(id, "stale hand-back ignored");
                    return;
                }
            }
            let Some(outcome) = unit.take_output() else {
                crate::log_unit!(id, "awaiting rerun");
                return;
            };
            in_flight.remove(&id);
            outcome
        };

        crate::log_unit!(id, "delivered", attempts = unit.attempts());
        unit.record().deliver(outcome);
    }

    fn backup(&self) -> Snapshot {
        assert!(
            self.executor.is_none() || self.is_owner(),
            "backup() must be called on the owner thread"
        );
        lock(&self.in_flight)
            .iter()
            .map(|(id, unit)| (*id, unit.pending_input()))
            .collect()
    }

    fn close(&self) {
        let units: Vec<Arc<WorkUnit>> = {
            let mut in_flight = lock(&self.in_flight);
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            in_flight.drain().map(|(_, unit)| unit).collect()
        };

        if let Some(pool) = &self.pool {
            let report = pool.stop();
            for unit in &report.undone {
                unit.close();
            }
            tracing::debug!(
                scheduler = %self.id,
                undone = report.undone.len(),
                terminated = report.terminated,
                "Pool stopped"
            );
        }

        let dropped = units.len();
        for unit in units {
            unit.close();
        }
        tracing::info!(scheduler = %self.id, dropped, "Scheduler closed");
    }
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use courier_api::{ActionResult, CancellationToken};

    use super::*;

    #[test]
    fn synchronous_mode_delivers_inline() {
        let (tx, rx) = mpsc::channel();
        let scheduler = Scheduler::serial()
            .get(
                |s: String, _: &CancellationToken| Ok(Some(s.len())),
                move |result: ActionResult<Option<usize>>| tx.send(result.unwrap()).unwrap(),
            )
            .build()
            .unwrap();

        assert!(scheduler.is_synchronous());
        scheduler.apply(ActionId(0), String::from("abc"));
        assert_eq!(rx.try_recv().unwrap(), Some(3));
        assert_eq!(scheduler.in_flight_len(), 0);
        assert_eq!(scheduler.worker_count(), 0);
    }

    #[test]
    #[should_panic(expected = "no action registered for action#5")]
    fn unknown_id_panics() {
        let scheduler = Scheduler::serial().build().unwrap();
        scheduler.apply(ActionId(5), 1u8);
    }

    #[test]
    #[should_panic(expected = "expects")]
    fn wrong_input_type_panics() {
        let scheduler = Scheduler::serial()
            .set(|_: u32, _: &CancellationToken| Ok(()))
            .build()
            .unwrap();
        scheduler.apply(ActionId(0), String::from("nope"));
    }

    #[test]
    fn diagnostics_describe_registrations() {
        let scheduler = Scheduler::parallel()
            .get(|_: (), _: &CancellationToken| Ok(Some(1u8)), |_: ActionResult<Option<u8>>| {})
            .set(|_: u32, _: &CancellationToken| Ok(()))
            .void(|_: &CancellationToken| Ok(()))
            .build()
            .unwrap();

        assert_eq!(scheduler.action_count(), 3);
        assert_eq!(scheduler.kind(ActionId(0)), Some(ActionKind::Get));
        assert_eq!(scheduler.kind(ActionId(1)), Some(ActionKind::Set));
        assert_eq!(scheduler.kind(ActionId(2)), Some(ActionKind::Void));
        assert_eq!(scheduler.kind(ActionId(3)), None);
        assert!(scheduler.is_owner());
        assert!(!scheduler.is_closed());
    }

    #[test]
    fn close_is_idempotent() {
        let scheduler = Scheduler::serial().build().unwrap();
        scheduler.close();
        scheduler.close();
        assert!(scheduler.is_closed());
    }
}
