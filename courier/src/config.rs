use std::time::Duration;

use crate::error::PoolError;

/// Capacity of the pool's task queue in both modes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// How long an idle worker waits for a task before exiting.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Upper bound `stop()` waits for running workers to finish.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

pub const DEFAULT_THREAD_NAME_PREFIX: &str = "courier";

// --- Configuration Enums ---

/// Determines how many worker threads run registered actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolMode {
    /// Exactly one worker; units run one after another in submission order.
    Serial,
    /// Several workers sized to the CPU count; units for different actions
    /// run concurrently.
    #[default]
    Parallel,
}

// --- Pool Configuration ---

/// Sizing and lifecycle settings of a worker pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers started eagerly by submissions before tasks start queueing.
    pub core_threads: usize,

    /// Hard limit on live workers; reached only when the queue is full.
    pub max_threads: usize,

    /// Capacity of the bounded task queue.
    pub queue_capacity: usize,

    /// Idle time after which a worker exits.
    pub keep_alive: Duration,

    /// Whether core workers exit after `keep_alive` as well.
    pub allow_core_timeout: bool,

    /// Bounded wait for running workers during `stop()`.
    pub stop_timeout: Duration,

    /// First segment of every worker thread name.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::parallel()
    }
}

impl PoolConfig {
    /// Single worker that never times out.
    pub fn serial() -> Self {
        Self {
            core_threads: 1,
            max_threads: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keep_alive: DEFAULT_KEEP_ALIVE,
            allow_core_timeout: false,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }

    /// Parallel pool sized to this machine.
    pub fn parallel() -> Self {
        Self::with_cpu_count(num_cpus::get())
    }

    /// Parallel pool sized for `cpus` processors:
    /// core = `clamp(cpus - 1, 2, 4)`, max = `2 * cpus + 1`.
    pub fn with_cpu_count(cpus: usize) -> Self {
        let cpus = cpus.max(1);
        Self {
            core_threads: (cpus - 1).clamp(2, 4),
            max_threads: cpus * 2 + 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keep_alive: DEFAULT_KEEP_ALIVE,
            allow_core_timeout: true,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }

    pub fn for_mode(mode: PoolMode) -> Self {
        match mode {
            PoolMode::Serial => Self::serial(),
            PoolMode::Parallel => Self::parallel(),
        }
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Rejects settings the pool cannot honor.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_threads == 0 {
            return Err(PoolError::InvalidConfig("max_threads must be at least 1".to_string()));
        }
        if self.core_threads > self.max_threads {
            return Err(PoolError::InvalidConfig(format!(
                "core_threads ({}) exceeds max_threads ({})",
                self.core_threads, self.max_threads
            )));
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig("queue_capacity must be at least 1".to_string()));
        }
        if self.keep_alive.is_zero() && (self.allow_core_timeout || self.max_threads > self.core_threads) {
            return Err(PoolError::InvalidConfig(
                "keep_alive must be non-zero when workers can time out".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_sizing_follows_cpu_count() {
        let one = PoolConfig::with_cpu_count(1);
        assert_eq!((one.core_threads, one.max_threads), (2, 3));

        let four = PoolConfig::with_cpu_count(4);
        assert_eq!((four.core_threads, four.max_threads), (3, 9));

        let sixteen = PoolConfig::with_cpu_count(16);
        assert_eq!((sixteen.core_threads, sixteen.max_threads), (4, 33));
    }

    #[test]
    fn zero_cpus_is_treated_as_one() {
        assert_eq!(PoolConfig::with_cpu_count(0), PoolConfig::with_cpu_count(1));
    }

    #[test]
    fn serial_has_one_thread() {
        let config = PoolConfig::serial();
        assert_eq!(config.core_threads, 1);
        assert_eq!(config.max_threads, 1);
        assert!(!config.allow_core_timeout);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn core_above_max_is_rejected() {
        let config = PoolConfig {
            core_threads: 5,
            max_threads: 2,
            ..PoolConfig::serial()
        };
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }
}
