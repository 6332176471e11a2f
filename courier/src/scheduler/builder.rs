use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;

use courier_api::{
    ActionError, ActionId, ActionResult, CancellationToken, OwnerExecutor, Payload, Snapshot,
    StdThreadFactory, ThreadFactory,
};
use uuid::Uuid;

use super::hooks::SchedulerHooks;
use super::{Scheduler, SchedulerCore};
use crate::config::{PoolConfig, PoolMode};
use crate::error::PoolError;
use crate::pool::WorkerPool;
use crate::record::{ActionRecord, GetRecord, SetRecord, VoidRecord};

/// Registers actions and assembles a [`Scheduler`].
///
/// Action ids are handed out densely in registration order: the first
/// registered action is `ActionId(0)`, the next `ActionId(1)`, and so on.
/// Callbacks run on the owner thread, which is the thread calling
/// [`build`](Self::build).
pub struct SchedulerBuilder {
    mode: PoolMode,
    records: Vec<Arc<dyn ActionRecord>>,
    executor: Option<Arc<dyn OwnerExecutor>>,
    factory: Option<Arc<dyn ThreadFactory>>,
    pool_config: Option<PoolConfig>,
    thread_name_prefix: Option<String>,
    restored: Option<Snapshot>,
    initial: Snapshot,
}

impl SchedulerBuilder {
    pub fn new(mode: PoolMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            executor: None,
            factory: None,
            pool_config: None,
            thread_name_prefix: None,
            restored: None,
            initial: Snapshot::new(),
        }
    }

    /// Id the next registered action will get.
    pub fn next_id(&self) -> ActionId {
        ActionId(self.records.len())
    }

    // --- Registration ---

    /// Registers a Get action. Failures are delivered to `on_result` as `Err`.
    pub fn get<I, T, F, R>(self, function: F, on_result: R) -> Self
    where
        I: Payload,
        T: Send + 'static,
        F: Fn(I, &CancellationToken) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
        R: Fn(ActionResult<Option<T>>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.register(Arc::new(GetRecord::new(id, function, on_result, None)))
    }

    /// Registers a Get action whose failures go to `on_error`; `on_result`
    /// then only ever receives `Ok`.
    pub fn get_with_error<I, T, F, R, E>(self, function: F, on_result: R, on_error: E) -> Self
    where
        I: Payload,
        T: Send + 'static,
        F: Fn(I, &CancellationToken) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
        R: Fn(ActionResult<Option<T>>) + Send + Sync + 'static,
        E: Fn(ActionError) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.register(Arc::new(GetRecord::new(id, function, on_result, Some(Box::new(on_error)))))
    }

    /// Registers a Set action. Failures are logged and dropped.
    pub fn set<T, F>(self, function: F) -> Self
    where
        T: Payload,
        F: Fn(T, &CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.register(Arc::new(SetRecord::new(id, function, None)))
    }

    pub fn set_with_error<T, F, E>(self, function: F, on_error: E) -> Self
    where
        T: Payload,
        F: Fn(T, &CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
        E: Fn(ActionError) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.register(Arc::new(SetRecord::new(id, function, Some(Box::new(on_error)))))
    }

    /// Registers a Void action, requested with [`Scheduler::apply_void`].
    /// Failures are logged and dropped.
    pub fn void<F>(self, function: F) -> Self
    where
        F: Fn(&CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.register(Arc::new(VoidRecord::new(id, function, None)))
    }

    pub fn void_with_error<F, E>(self, function: F, on_error: E) -> Self
    where
        F: Fn(&CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
        E: Fn(ActionError) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.register(Arc::new(VoidRecord::new(id, function, Some(Box::new(on_error)))))
    }

    fn register(mut self, record: Arc<dyn ActionRecord>) -> Self {
        tracing::trace!(action = %record.id(), kind = %record.kind(), "Action registered");
        self.records.push(record);
        self
    }

    // --- Environment ---

    /// Executor posting jobs onto the owner thread. Without one the
    /// scheduler runs every action inline on the calling thread.
    pub fn executor<E: OwnerExecutor + 'static>(mut self, executor: E) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn factory<F: ThreadFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Overrides the pool sizing derived from the mode.
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = Some(config);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    // --- State ---

    /// Snapshot saved by a previous scheduler's `backup()`. `None` means a
    /// first start, in which case the [`init`](Self::init) inputs apply.
    pub fn restore(mut self, snapshot: Option<Snapshot>) -> Self {
        self.restored = snapshot;
        self
    }

    /// Input requested at first start. Ignored when a snapshot is restored.
    pub fn init<I: Payload>(mut self, id: ActionId, input: I) -> Self {
        self.initial.insert(id, input);
        self
    }

    /// Whether this is a first start (no snapshot restored).
    pub fn is_initial(&self) -> bool {
        self.restored.is_none()
    }

    /// Builds the scheduler on the calling thread, which becomes its owner,
    /// then re-applies the restored (or initial) inputs.
    ///
    /// # Errors
    /// `PoolError::InvalidConfig` when the pool configuration is unusable.
    ///
    /// # Panics
    /// When a snapshot entry names an unregistered id or has the wrong type.
    pub fn build(self) -> Result<Scheduler, PoolError> {
        let SchedulerBuilder {
            mode,
            records,
            executor,
            factory,
            pool_config,
            thread_name_prefix,
            restored,
            initial,
        } = self;

        let config = match &executor {
            Some(_) => {
                let mut config = pool_config.unwrap_or_else(|| PoolConfig::for_mode(mode));
                if let Some(prefix) = thread_name_prefix {
                    config.thread_name_prefix = prefix;
                }
                config.validate()?;
                Some(config)
            }
            None => None,
        };
        let factory: Arc<dyn ThreadFactory> = match factory {
            Some(factory) => factory,
            None => Arc::new(StdThreadFactory::new()),
        };

        let is_initial = restored.is_none();
        let id = Uuid::new_v4();
        let closed = Arc::new(AtomicBool::new(false));
        let action_count = records.len();

        let core = Arc::new_cyclic(|weak| {
            let pool = match (&executor, config) {
                (Some(executor), Some(config)) => {
                    let hooks = SchedulerHooks::new(weak.clone(), Arc::clone(executor), Arc::clone(&closed));
                    Some(WorkerPool::new(config, factory, Arc::new(hooks)))
                }
                _ => None,
            };
            SchedulerCore {
                id,
                owner: thread::current().id(),
                mode,
                records,
                executor,
                pool,
                in_flight: Mutex::new(Default::default()),
                closed,
                weak: weak.clone(),
            }
        });
        let scheduler = Scheduler { core };

        tracing::info!(
            scheduler = %id,
            mode = ?mode,
            actions = action_count,
            synchronous = scheduler.is_synchronous(),
            restored = !is_initial,
            "Scheduler opened"
        );

        let snapshot = restored.unwrap_or(initial);
        for (action, input) in snapshot {
            scheduler.apply_boxed(action, input);
        }
        Ok(scheduler)
    }
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("mode", &self.mode)
            .field("records", &self.records)
            .field("executor", &self.executor)
            .field("pool_config", &self.pool_config)
            .field("restored", &self.restored)
            .field("initial", &self.initial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_in_registration_order() {
        let builder = Scheduler::serial();
        assert_eq!(builder.next_id(), ActionId(0));

        let builder = builder
            .set(|_: u8, _: &CancellationToken| Ok(()))
            .void(|_: &CancellationToken| Ok(()));
        assert_eq!(builder.next_id(), ActionId(2));
    }

    #[test]
    fn restore_controls_is_initial() {
        assert!(Scheduler::serial().is_initial());
        assert!(Scheduler::serial().restore(None).is_initial());
        assert!(!Scheduler::serial().restore(Some(Snapshot::new())).is_initial());
    }

    #[test]
    fn invalid_pool_config_is_rejected() {
        let main_loop = crate::MainLoop::new();
        let config = PoolConfig {
            queue_capacity: 0,
            ..PoolConfig::serial()
        };
        let result = Scheduler::serial()
            .executor(main_loop.handle())
            .pool_config(config)
            .build();
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }
}
