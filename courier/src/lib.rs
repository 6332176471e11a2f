// Courier Owner-Thread Action Scheduler
//
// This crate implements the engine behind the courier API: action records,
// coalescing work units, the worker pool and the scheduler that ties them to
// an owner thread. Host-facing contracts live in `courier-api` and are
// re-exported here.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pool;
pub mod scheduler;

mod record;
mod unit;

// Re-export commonly used types
pub use config::{PoolConfig, PoolMode};
pub use error::{ExecutorError, PoolError};
pub use executor::{LoopHandle, MainLoop, TokioExecutor};
pub use scheduler::{Scheduler, SchedulerBuilder};

pub use courier_api::{
    ActionError, ActionId, ActionKind, ActionResult, BoxedPayload, CancellationToken, Cancelled,
    Job, OwnerExecutor, Payload, Snapshot, StdThreadFactory, ThreadFactory,
};
