//! # Worker Pool
//!
//! A bounded pool of OS threads that executes work units off the owner
//! thread. The pool knows nothing about actions; it runs [`Task`]s and calls
//! [`PoolHooks`] around each one, which is where the scheduler binds workers
//! to units and hands finished units back to the owner thread.
//!
//! ## Key Concepts
//! - **Core and max size**: submissions start workers eagerly up to the core
//!   size, then queue; only a full queue grows the pool towards max size
//! - **Keep-alive**: idle workers above core size (and core workers when
//!   allowed) exit after the keep-alive period
//! - **Stop**: drains the queue, interrupts running tasks and waits a bounded
//!   time for workers to exit
//!
//! ## Design Principles
//! - Workers are created lazily, so building a pool never fails
//! - Submission decisions and worker retirement share one lock, so a queued
//!   task always has a worker to pick it up
//! - Threads come from an injected [`ThreadFactory`]

mod worker;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use courier_api::ThreadFactory;
use flume::{Receiver, Sender, TrySendError};

use crate::config::PoolConfig;
use crate::error::{lock, PoolError};

pub use worker::WorkerInfo;

/// Process-wide pool counter used in thread names.
static POOL_NUMBER: AtomicUsize = AtomicUsize::new(1);

/// Work the pool can execute.
pub trait Task: Send + Sync + 'static {
    fn run(&self);

    /// Asks a running task to stop early. Called from the stopping thread.
    fn interrupt(&self);
}

impl<T: Task + ?Sized> Task for Arc<T> {
    fn run(&self) {
        (**self).run()
    }

    fn interrupt(&self) {
        (**self).interrupt()
    }
}

/// Callbacks around task execution. All run on the worker thread except
/// `terminated`, which runs on the thread that observed the last worker exit
/// during `stop`.
pub trait PoolHooks<T>: Send + Sync {
    fn before_run(&self, _worker: &WorkerInfo, _task: &T) {}

    /// `panic` carries the message when the task itself panicked.
    fn after_run(&self, _worker: &WorkerInfo, _task: &T, _panic: Option<String>) {}

    fn terminated(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl<T> PoolHooks<T> for NoHooks {}

/// Result of [`WorkerPool::stop`].
#[derive(Debug)]
pub struct StopReport<T> {
    /// Tasks that were queued and never started.
    pub undone: Vec<T>,
    /// Whether every worker exited within the stop timeout.
    pub terminated: bool,
}

struct PoolState<T> {
    live: usize,
    next_worker: usize,
    running: HashMap<usize, T>,
    handles: HashMap<usize, JoinHandle<()>>,
}

pub(crate) struct PoolShared<T> {
    name: String,
    config: PoolConfig,
    factory: Arc<dyn ThreadFactory>,
    hooks: Arc<dyn PoolHooks<T>>,
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    state: Mutex<PoolState<T>>,
    exit_tx: Sender<usize>,
    exit_rx: Receiver<usize>,
    stopping: AtomicBool,
}

/// Bounded thread pool running tasks of type `T`.
pub struct WorkerPool<T: Task + Clone> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Task + Clone> WorkerPool<T> {
    /// Creates a pool without starting any thread.
    pub fn new(config: PoolConfig, factory: Arc<dyn ThreadFactory>, hooks: Arc<dyn PoolHooks<T>>) -> Self {
        let number = POOL_NUMBER.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = flume::bounded(config.queue_capacity);
        let (exit_tx, exit_rx) = flume::unbounded();

        let shared = PoolShared {
            name: format!("{}-{}", config.thread_name_prefix, number),
            config,
            factory,
            hooks,
            sender: Mutex::new(Some(sender)),
            receiver,
            state: Mutex::new(PoolState {
                live: 0,
                next_worker: 1,
                running: HashMap::new(),
                handles: HashMap::new(),
            }),
            exit_tx,
            exit_rx,
            stopping: AtomicBool::new(false),
        };
        crate::log_pool!(shared.name, "created", core = shared.config.core_threads, max = shared.config.max_threads);

        Self { shared: Arc::new(shared) }
    }

    /// Name shared by every worker thread of this pool, e.g. `courier-3`.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Workers currently alive.
    pub fn live_workers(&self) -> usize {
        lock(&self.shared.state).live
    }

    /// Tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.receiver.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Hands `task` to a worker, starting one if the policy allows.
    pub fn submit(&self, task: T) -> Result<(), PoolError> {
        let shared = &self.shared;
        let mut state = lock(&shared.state);
        if shared.stopping.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }

        if state.live < shared.config.core_threads {
            return shared.spawn_worker(&mut state, Some(task));
        }

        let sent = match lock(&shared.sender).as_ref() {
            Some(sender) => sender.try_send(task),
            None => return Err(PoolError::Stopped),
        };

        match sent {
            Ok(()) => {
                if state.live == 0 {
                    shared.spawn_worker(&mut state, None)?;
                }
                Ok(())
            }
            Err(TrySendError::Full(task)) if state.live < shared.config.max_threads => {
                shared.spawn_worker(&mut state, Some(task))
            }
            Err(TrySendError::Full(_)) => Err(PoolError::QueueFull {
                capacity: shared.config.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::Stopped),
        }
    }

    /// Stops the pool immediately.
    ///
    /// Queued tasks are returned undone, running tasks are interrupted, and
    /// the call waits up to the configured stop timeout for workers to exit.
    /// Calling it again only re-checks termination.
    pub fn stop(&self) -> StopReport<T> {
        let shared = &self.shared;
        if shared.stopping.swap(true, Ordering::AcqRel) {
            return StopReport {
                undone: Vec::new(),
                terminated: self.await_termination(Duration::ZERO),
            };
        }

        let (undone, running) = {
            let state = lock(&shared.state);
            lock(&shared.sender).take();
            let undone: Vec<T> = shared.receiver.drain().collect();
            let running: Vec<T> = state.running.values().cloned().collect();
            (undone, running)
        };

        crate::log_pool!(shared.name, "stopping", undone = undone.len(), running = running.len());
        for task in &running {
            task.interrupt();
        }

        let terminated = self.await_termination(shared.config.stop_timeout);
        if terminated {
            shared.hooks.terminated();
        } else {
            tracing::debug!(pool = %shared.name, "Workers still running after stop timeout");
        }
        StopReport { undone, terminated }
    }

    /// Waits until every worker except the calling one has exited.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        let deadline = Instant::now() + timeout;
        let current = thread::current().id();

        loop {
            let finished = {
                let mut state = lock(&shared.state);
                let on_worker = state.handles.values().any(|h| h.thread().id() == current);
                if state.live > usize::from(on_worker) {
                    None
                } else {
                    let ids: Vec<usize> = state
                        .handles
                        .iter()
                        .filter(|(_, h)| h.thread().id() != current)
                        .map(|(id, _)| *id)
                        .collect();
                    Some(ids.into_iter().filter_map(|id| state.handles.remove(&id)).collect::<Vec<_>>())
                }
            };

            if let Some(handles) = finished {
                for handle in handles {
                    let _ = handle.join();
                }
                return true;
            }
            if shared.exit_rx.recv_deadline(deadline).is_err() && Instant::now() >= deadline {
                return false;
            }
        }
    }
}

impl<T: Task + Clone> fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("live", &self.live_workers())
            .field("queued", &self.queued())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl<T: Task + Clone> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if !self.is_stopped() {
            self.stop();
        }
    }
}

impl<T: Task + Clone> PoolShared<T> {
    /// Starts a worker, optionally with its first task. Caller holds the
    /// state lock.
    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState<T>, first: Option<T>) -> Result<(), PoolError> {
        self.reap_exited(state);

        let id = state.next_worker;
        let info = WorkerInfo::new(id, format!("{}-worker-{}", self.name, id));
        let shared = Arc::clone(self);
        let name = info.name().to_string();
        let handle = self
            .factory
            .new_thread(name, Box::new(move || worker::run(shared, info, first)))?;

        state.next_worker += 1;
        state.live += 1;
        state.handles.insert(id, handle);
        tracing::trace!(pool = %self.name, worker = id, live = state.live, "Worker started");
        Ok(())
    }

    /// Joins handles of workers that already retired.
    fn reap_exited(&self, state: &mut PoolState<T>) {
        while let Ok(id) = self.exit_rx.try_recv() {
            if let Some(handle) = state.handles.remove(&id) {
                let _ = handle.join();
            }
        }
    }
}
