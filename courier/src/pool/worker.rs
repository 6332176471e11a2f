//! Worker loop of the pool.
//!
//! A worker runs its first task (if it was started with one), then keeps
//! taking tasks from the shared queue until the pool stops or it has been
//! idle for longer than the keep-alive period.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use flume::RecvTimeoutError;

use super::{PoolShared, Task};
use crate::error::{lock, panic_message};

/// Identity of a pool worker, handed to the hooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerInfo {
    id: usize,
    name: String,
}

impl WorkerInfo {
    pub(crate) fn new(id: usize, name: String) -> Self {
        Self { id, name }
    }

    /// Number of the worker within its pool, starting at 1.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Thread name of the worker.
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(super) fn run<T: Task + Clone>(shared: Arc<PoolShared<T>>, info: WorkerInfo, first: Option<T>) {
    tracing::trace!(worker = %info.name, "Worker loop entered");

    let mut next = first;
    loop {
        let task = match next.take() {
            Some(task) => task,
            None => match next_task(&shared) {
                Some(task) => task,
                None => break,
            },
        };
        run_task(&shared, &info, task);
    }

    let _ = shared.exit_tx.send(info.id);
    tracing::trace!(worker = %info.name, "Worker loop exited");
}

/// Blocks for the next task. Returns `None` once this worker has retired;
/// the live count is already decremented by then.
fn next_task<T: Task + Clone>(shared: &PoolShared<T>) -> Option<T> {
    loop {
        let timed = {
            let mut state = lock(&shared.state);
            if shared.stopping.load(Ordering::Acquire) {
                state.live -= 1;
                return None;
            }
            shared.config.allow_core_timeout || state.live > shared.config.core_threads
        };

        let received = if timed {
            shared.receiver.recv_timeout(shared.config.keep_alive)
        } else {
            shared.receiver.recv().map_err(|_| RecvTimeoutError::Disconnected)
        };

        match received {
            Ok(task) => return Some(task),
            Err(RecvTimeoutError::Timeout) => {
                let mut state = lock(&shared.state);
                // The last worker stays while work is queued.
                if state.live > 1 || shared.receiver.is_empty() {
                    state.live -= 1;
                    tracing::trace!(live = state.live, "Idle worker retired");
                    return None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                lock(&shared.state).live -= 1;
                return None;
            }
        }
    }
}

fn run_task<T: Task + Clone>(shared: &PoolShared<T>, info: &WorkerInfo, task: T) {
    lock(&shared.state).running.insert(info.id, task.clone());
    if shared.stopping.load(Ordering::Acquire) {
        task.interrupt();
    }

    let panic = panic::catch_unwind(AssertUnwindSafe(|| {
        shared.hooks.before_run(info, &task);
        task.run();
    }))
    .err()
    .map(|payload| panic_message(&*payload));

    if let Some(message) = &panic {
        crate::log_error!(message, worker = %info.name, "Task panicked");
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| shared.hooks.after_run(info, &task, panic))) {
        crate::log_error!(panic_message(&*payload), worker = %info.name, "after_run hook panicked");
    }

    lock(&shared.state).running.remove(&info.id);
}
