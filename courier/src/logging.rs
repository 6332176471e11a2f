// Logging System for Courier
//
// This module provides a unified logging interface for the courier scheduler.
// It's built on top of the `tracing` ecosystem: the engine emits events and
// spans through `tracing`, and hosts that have no subscriber of their own can
// install one with the functions below.
//
// Levels used by the engine:
// - INFO: scheduler opened and closed
// - DEBUG: work unit lifecycle (queued, superseded, completed, delivered)
// - TRACE: worker pool internals
// - WARN: action errors dropped because no error sink was registered
//
// # Usage Examples
//
// ```rust,ignore
// use courier::logging;
//
// // Default settings (INFO level, console output)
// logging::init_default();
//
// // Development: DEBUG level, courier internals at TRACE
// logging::init_development();
//
// // Production: JSON lines, no file/line information
// logging::init_production();
//
// // Console plus an append-only file
// logging::init_with_file(logging::LogConfig::default(), "/var/log/app/courier.log").unwrap();
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the courier logging system
///
/// # Examples
///
/// ```rust
/// use courier::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("courier::pool=trace".to_string()),
///     ..Default::default()
/// };
/// assert!(config.show_thread_info);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; worker threads carry pool names
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.trim().parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

/// Initialize the logging system with the given configuration
///
/// Sets up the global tracing subscriber. Safe to call multiple times; only
/// the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(
                registry.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            )
        } else if config.show_time {
            Box::new(registry.with(console_layer(&config)))
        } else {
            Box::new(registry.with(console_layer(&config).without_time()))
        };

        set_global_subscriber(subscriber);
    });
}

fn console_layer<S>(config: &LogConfig) -> fmt::Layer<S>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info)
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Opens `path` for appending, creating it if needed.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Initialize logging with both console and file output
///
/// Console output respects the terminal's color support; file output is
/// always plain text with file/line and thread information.
///
/// # Errors
/// Returns an error if the log file cannot be opened.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    // Fail early instead of silently falling back to stderr later.
    drop(file_writer(log_file)?);

    INIT.call_once(|| {
        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config))
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// Initialize default logging: INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging optimized for development environments
///
/// - DEBUG level for all modules, TRACE for the worker pool
/// - Colorized console output with file/line information
/// - Thread names and IDs displayed
pub fn init_development() {
    init(development_config());
}

fn development_config() -> LogConfig {
    LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("courier=debug,courier::pool=trace".to_string()),
    }
}

/// Initialize logging optimized for production environments
///
/// JSON formatted output for log aggregators, no file/line information,
/// thread information kept for diagnostics.
pub fn init_production() {
    init(production_config());
}

fn production_config() -> LogConfig {
    LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    }
}

/// Initialize logging for testing
///
/// Only warnings and errors, no thread information, no timestamps.
///
/// ```rust
/// courier::logging::init_test();
/// courier::logging::init_test(); // later calls are ignored
/// ```
pub fn init_test() {
    init(test_config());
}

fn test_config() -> LogConfig {
    LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    }
}

/// Create a span covering one work unit's execution
///
/// ```rust
/// use courier::unit_span;
/// use courier::{ActionId, ActionKind};
///
/// let span = unit_span!(ActionId(0), ActionKind::Get);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! unit_span {
    ($action:expr, $kind:expr) => {
        tracing::debug_span!("unit", action = %$action, kind = %$kind)
    };
    ($action:expr, $kind:expr, $($fields:tt)*) => {
        tracing::debug_span!("unit", action = %$action, kind = %$kind, $($fields)*)
    };
}

/// Log work unit lifecycle events
///
/// ```rust
/// use courier::log_unit;
/// use courier::ActionId;
///
/// log_unit!(ActionId(3), "queued");
/// log_unit!(ActionId(3), "superseded", generation = 2);
/// ```
#[macro_export]
macro_rules! log_unit {
    ($action:expr, $event:expr) => {
        tracing::debug!(action = %$action, event = $event)
    };
    ($action:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(action = %$action, event = $event, $($fields)*)
    };
}

/// Log worker pool events
///
/// ```rust
/// use courier::log_pool;
///
/// log_pool!("courier-1", "stopping", undone = 0);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($pool:expr, $event:expr) => {
        tracing::trace!(pool = %$pool, event = $event)
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::trace!(pool = %$pool, event = $event, $($fields)*)
    };
}

/// Log error events - use for all error conditions
///
/// ```rust
/// use courier::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
/// log_error!(error);
/// log_error!(error, component = "pool");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error)
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*)
    };
}

/// Get the current tracing dispatcher
///
/// Pass it to threads created by a custom [`ThreadFactory`](courier_api::ThreadFactory)
/// that must log through a scoped (non-global) subscriber.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
