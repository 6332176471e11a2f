use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use courier_api::OwnerExecutor;

use super::SchedulerCore;
use crate::pool::{PoolHooks, WorkerInfo};
use crate::unit::WorkUnit;

/// Pool hooks of a scheduler: bind the worker to the unit before it runs
/// and trampoline the finished unit back to the owner thread.
pub(crate) struct SchedulerHooks {
    core: Weak<SchedulerCore>,
    executor: Arc<dyn OwnerExecutor>,
    closed: Arc<AtomicBool>,
}

impl SchedulerHooks {
    pub(crate) fn new(core: Weak<SchedulerCore>, executor: Arc<dyn OwnerExecutor>, closed: Arc<AtomicBool>) -> Self {
        Self { core, executor, closed }
    }
}

impl PoolHooks<Arc<WorkUnit>> for SchedulerHooks {
    fn before_run(&self, worker: &WorkerInfo, unit: &Arc<WorkUnit>) {
        unit.bind(worker.name());
        crate::log_unit!(unit.id(), "running", worker = worker.name());
    }

    fn after_run(&self, worker: &WorkerInfo, unit: &Arc<WorkUnit>, panic: Option<String>) {
        if let Some(message) = panic {
            unit.fail(message);
        }
        unit.unbind(worker.name());

        if self.closed.load(Ordering::Acquire) {
            crate::log_unit!(unit.id(), "dropped", reason = "scheduler closed");
            return;
        }

        let core = self.core.clone();
        let unit = Arc::clone(unit);
        self.executor.execute(Box::new(move || {
            if let Some(core) = core.upgrade() {
                core.finish(&unit);
            }
        }));
    }

    fn terminated(&self) {
        tracing::trace!("Scheduler pool terminated");
    }
}
