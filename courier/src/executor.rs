//! # Owner Executors
//!
//! Ready-made [`OwnerExecutor`] implementations. The scheduler posts every
//! owner-thread job through one of these: trampolined `apply` calls from
//! other threads and the hand-back of finished work units.
//!
//! - [`MainLoop`] is a pumped job queue for plain threads. The owner thread
//!   drains it with [`MainLoop::run_pending`] or blocks in
//!   [`MainLoop::run_until`]; other threads post through a [`LoopHandle`].
//! - [`TokioExecutor`] spawns jobs onto a current-thread tokio runtime, whose
//!   tasks all run on the thread driving it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use courier_api::{Job, OwnerExecutor};
use crossbeam_queue::SegQueue;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::ExecutorError;

struct LoopShared {
    queue: SegQueue<Job>,
    owner: Thread,
    closed: AtomicBool,
}

/// Job queue pumped by the thread that created it.
pub struct MainLoop {
    shared: Arc<LoopShared>,
    // Pumping must stay on the creating thread.
    _not_send: PhantomData<*const ()>,
}

/// Posting side of a [`MainLoop`]; cheap to clone and usable anywhere.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl MainLoop {
    /// Creates a loop owned by the calling thread.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LoopShared {
                queue: SegQueue::new(),
                owner: thread::current(),
                closed: AtomicBool::new(false),
            }),
            _not_send: PhantomData,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Runs queued jobs, including jobs they post, until the queue is empty.
    /// Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.shared.queue.pop() {
            job();
            ran += 1;
        }
        ran
    }

    /// Pumps the queue until `done` returns true or `timeout` elapses.
    /// Returns whether `done` became true.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.shared.queue.is_empty() {
                thread::park_timeout(deadline - now);
            }
        }
    }

    /// Pumps the queue for `duration`.
    pub fn run_for(&self, duration: Duration) {
        self.run_until(duration, || false);
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        self.shared.discard_pending();
    }
}

impl LoopShared {
    fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        while self.queue.pop().is_some() {
            discarded += 1;
        }
        discarded
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop")
            .field("owner", &self.shared.owner.name())
            .field("pending", &self.shared.queue.len())
            .finish()
    }
}

impl LoopHandle {
    /// Whether the loop has been dropped; posted jobs are discarded then.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl OwnerExecutor for LoopHandle {
    fn execute(&self, job: Job) {
        if self.is_closed() {
            tracing::debug!("Main loop dropped, discarding job");
            return;
        }
        self.shared.queue.push(job);
        fence(Ordering::SeqCst);
        // The loop may have been dropped after the check above; its drain
        // could have missed this job.
        if self.is_closed() {
            let discarded = self.shared.discard_pending();
            tracing::debug!(discarded, "Main loop dropped while posting, discarding jobs");
            return;
        }
        self.shared.owner.unpark();
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("owner", &self.shared.owner.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Posts jobs onto a current-thread tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Executor for the runtime the caller is running on.
    pub fn current() -> Result<Self, ExecutorError> {
        let handle = Handle::try_current().map_err(|_| ExecutorError::NoRuntime)?;
        Self::new(handle)
    }

    /// Only current-thread runtimes qualify: a multi-thread runtime would run
    /// jobs on arbitrary workers.
    pub fn new(handle: Handle) -> Result<Self, ExecutorError> {
        match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Ok(Self { handle }),
            other => Err(ExecutorError::UnsupportedFlavor(format!("{other:?}"))),
        }
    }
}

impl OwnerExecutor for TokioExecutor {
    fn execute(&self, job: Job) {
        self.handle.spawn(async move { job() });
    }
}
