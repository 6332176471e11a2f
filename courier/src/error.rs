use std::any::Any;
use std::io;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

/// Errors related to worker pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },
    #[error("Pool is stopped")]
    Stopped,
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors related to owner executors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("No tokio runtime is running on this thread")]
    NoRuntime,
    #[error("Owner executor needs a current-thread runtime, found {0}")]
    UnsupportedFlavor(String),
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// User callbacks never run while one of these locks is held, so a poisoned
/// lock only means a panic unwound through engine bookkeeping, and the data
/// is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
