// Integration tests for the worker pool: submission policy, naming,
// hooks, keep-alive and stop.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use courier::pool::{NoHooks, PoolHooks, Task, WorkerInfo, WorkerPool};
use courier::{PoolConfig, PoolError, StdThreadFactory, ThreadFactory};

use test_helpers::{wait_until, Gate, DEFAULT_TIMEOUT};

/// Task that blocks on a gate until opened or interrupted
#[derive(Clone)]
struct GatedTask {
    label: String,
    gate: Gate,
    interrupted: Arc<AtomicBool>,
    runs: Arc<AtomicUsize>,
}

impl GatedTask {
    fn new(label: &str, gate: &Gate) -> Self {
        Self {
            label: label.to_string(),
            gate: gate.clone(),
            interrupted: Arc::new(AtomicBool::new(false)),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Task for GatedTask {
    fn run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let token = courier::CancellationToken::new(
            Arc::new(Default::default()),
            0,
            self.interrupted.clone(),
        );
        let _ = self.gate.wait_cancellable(&self.label, &token);
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

fn small_config(core: usize, max: usize, queue: usize) -> PoolConfig {
    PoolConfig {
        core_threads: core,
        max_threads: max,
        queue_capacity: queue,
        ..PoolConfig::serial()
    }
}

fn pool_with(config: PoolConfig) -> WorkerPool<GatedTask> {
    WorkerPool::new(config, Arc::new(StdThreadFactory::new()), Arc::new(NoHooks))
}

#[test]
fn full_queue_at_max_size_is_rejected() {
    let gate = Gate::new();
    let pool = pool_with(small_config(1, 1, 2));

    pool.submit(GatedTask::new("running", &gate)).unwrap();
    pool.submit(GatedTask::new("queued-1", &gate)).unwrap();
    pool.submit(GatedTask::new("queued-2", &gate)).unwrap();

    let overflow = pool.submit(GatedTask::new("overflow", &gate));
    assert!(matches!(overflow, Err(PoolError::QueueFull { capacity: 2 })));
    assert_eq!(pool.queued(), 2);

    gate.open();
    assert!(wait_until(DEFAULT_TIMEOUT, || pool.queued() == 0));
}

#[test]
fn full_queue_grows_the_pool_up_to_max() {
    let gate = Gate::new();
    let pool = pool_with(small_config(1, 2, 1));

    pool.submit(GatedTask::new("a", &gate)).unwrap();
    pool.submit(GatedTask::new("b", &gate)).unwrap();
    assert_eq!(pool.live_workers(), 1);

    pool.submit(GatedTask::new("c", &gate)).unwrap();
    assert_eq!(pool.live_workers(), 2);
    assert!(gate.await_entries(2, DEFAULT_TIMEOUT));

    assert!(matches!(
        pool.submit(GatedTask::new("d", &gate)),
        Err(PoolError::QueueFull { .. })
    ));
    gate.open();
}

#[test]
fn stop_interrupts_running_and_returns_queued_tasks() {
    let gate = Gate::new();
    let pool = pool_with(small_config(1, 1, 8));

    let running = GatedTask::new("running", &gate);
    pool.submit(running.clone()).unwrap();
    assert!(gate.await_entries(1, DEFAULT_TIMEOUT));

    for label in ["q1", "q2", "q3"] {
        pool.submit(GatedTask::new(label, &gate)).unwrap();
    }

    let report = pool.stop();
    assert!(report.terminated);
    assert!(running.interrupted.load(Ordering::SeqCst));

    let undone: Vec<_> = report.undone.iter().map(|task| task.label.as_str()).collect();
    assert_eq!(undone, vec!["q1", "q2", "q3"]);
    assert!(report.undone.iter().all(|task| task.runs.load(Ordering::SeqCst) == 0));

    assert!(matches!(pool.submit(GatedTask::new("late", &gate)), Err(PoolError::Stopped)));
    assert_eq!(pool.live_workers(), 0);
}

#[test]
fn stop_gives_up_after_the_timeout() {
    let gate = Gate::new();
    let config = small_config(1, 1, 4).with_stop_timeout(Duration::from_millis(100));
    let pool: WorkerPool<Arc<Stubborn>> =
        WorkerPool::new(config, Arc::new(StdThreadFactory::new()), Arc::new(NoHooks));

    pool.submit(Arc::new(Stubborn { gate: gate.clone() })).unwrap();
    assert!(gate.await_entries(1, DEFAULT_TIMEOUT));

    let report = pool.stop();
    assert!(!report.terminated);

    gate.open();
    assert!(pool.await_termination(DEFAULT_TIMEOUT));
}

/// Ignores interruption entirely
struct Stubborn {
    gate: Gate,
}

impl Task for Stubborn {
    fn run(&self) {
        self.gate.wait("stubborn");
    }

    fn interrupt(&self) {}
}

#[derive(Debug, Default)]
struct RecordingFactory {
    inner: StdThreadFactory,
    names: Mutex<Vec<String>>,
}

impl ThreadFactory for RecordingFactory {
    fn new_thread(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>> {
        self.names.lock().unwrap().push(name.clone());
        self.inner.new_thread(name, body)
    }
}

#[test]
fn workers_are_created_by_the_factory_with_pool_names() {
    let gate = Gate::new();
    gate.open();
    let factory = Arc::new(RecordingFactory::default());
    let pool: WorkerPool<GatedTask> = WorkerPool::new(
        PoolConfig::with_cpu_count(4).with_thread_name_prefix("gallery"),
        factory.clone(),
        Arc::new(NoHooks),
    );

    pool.submit(GatedTask::new("one", &gate)).unwrap();
    pool.submit(GatedTask::new("two", &gate)).unwrap();

    let names = factory.names.lock().unwrap().clone();
    assert_eq!(
        names,
        vec![format!("{}-worker-1", pool.name()), format!("{}-worker-2", pool.name())]
    );
    assert!(pool.name().starts_with("gallery-"));
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl PoolHooks<GatedTask> for RecordingHooks {
    fn before_run(&self, worker: &WorkerInfo, task: &GatedTask) {
        self.events.lock().unwrap().push(format!("before {} on {}", task.label, worker.id()));
    }

    fn after_run(&self, worker: &WorkerInfo, task: &GatedTask, panic: Option<String>) {
        assert!(panic.is_none());
        self.events.lock().unwrap().push(format!("after {} on {}", task.label, worker.id()));
    }
}

#[test]
fn hooks_bracket_every_task() {
    let gate = Gate::new();
    gate.open();
    let hooks = Arc::new(RecordingHooks::default());
    let pool: WorkerPool<GatedTask> = WorkerPool::new(PoolConfig::serial(), Arc::new(StdThreadFactory::new()), hooks.clone());

    pool.submit(GatedTask::new("a", &gate)).unwrap();
    pool.submit(GatedTask::new("b", &gate)).unwrap();

    assert!(wait_until(DEFAULT_TIMEOUT, || hooks.events.lock().unwrap().len() == 4));
    assert_eq!(
        *hooks.events.lock().unwrap(),
        vec!["before a on 1", "after a on 1", "before b on 1", "after b on 1"]
    );
}

struct Explosive;

impl Task for Explosive {
    fn run(&self) {
        panic!("task blew up");
    }

    fn interrupt(&self) {}
}

#[derive(Default)]
struct PanicHooks {
    panics: Mutex<Vec<Option<String>>>,
}

impl PoolHooks<Arc<Explosive>> for PanicHooks {
    fn after_run(&self, _worker: &WorkerInfo, _task: &Arc<Explosive>, panic: Option<String>) {
        self.panics.lock().unwrap().push(panic);
    }
}

#[test]
fn task_panics_reach_after_run_and_the_worker_survives() {
    let hooks = Arc::new(PanicHooks::default());
    let pool: WorkerPool<Arc<Explosive>> = WorkerPool::new(PoolConfig::serial(), Arc::new(StdThreadFactory::new()), hooks.clone());

    pool.submit(Arc::new(Explosive)).unwrap();
    pool.submit(Arc::new(Explosive)).unwrap();

    assert!(wait_until(DEFAULT_TIMEOUT, || hooks.panics.lock().unwrap().len() == 2));
    assert_eq!(pool.live_workers(), 1);
    assert!(hooks
        .panics
        .lock()
        .unwrap()
        .iter()
        .all(|panic| panic.as_deref() == Some("task blew up")));
}

#[test]
fn idle_workers_time_out_and_come_back_on_demand() {
    let gate = Gate::new();
    gate.open();
    let config = PoolConfig {
        keep_alive: Duration::from_millis(50),
        allow_core_timeout: true,
        ..PoolConfig::serial()
    };
    let pool = pool_with(config);

    pool.submit(GatedTask::new("first", &gate)).unwrap();
    assert!(wait_until(DEFAULT_TIMEOUT, || pool.live_workers() == 0));

    pool.submit(GatedTask::new("second", &gate)).unwrap();
    assert!(gate.await_entries(2, DEFAULT_TIMEOUT));
}
