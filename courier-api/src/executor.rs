use std::fmt;
use std::sync::Arc;

/// A unit of work posted to the owner thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on the scheduler's owner thread.
///
/// The scheduler re-enters the owner thread through this executor whenever
/// `apply` is called from another thread and whenever a worker finishes a
/// unit. Implementations must run every job on the thread that built the
/// scheduler, in the order the jobs were posted, and must not block the
/// caller.
pub trait OwnerExecutor: Send + Sync + fmt::Debug {
    fn execute(&self, job: Job);
}

impl<E: OwnerExecutor + ?Sized> OwnerExecutor for Arc<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

impl<E: OwnerExecutor + ?Sized> OwnerExecutor for Box<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}
