use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};

/// Creates the OS threads a worker pool runs on.
///
/// Hosts inject their own factory to apply platform-specific priority,
/// affinity or naming rules. The pool chooses the thread name; the factory
/// decides how the thread is started.
pub trait ThreadFactory: Send + Sync + fmt::Debug {
    fn new_thread(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>>;
}

/// Factory backed by [`std::thread::Builder`].
#[derive(Clone, Debug, Default)]
pub struct StdThreadFactory {
    stack_size: Option<usize>,
}

impl StdThreadFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack size for new threads; zero keeps the platform default.
    pub fn with_stack_size(stack_size: usize) -> Self {
        Self {
            stack_size: (stack_size > 0).then_some(stack_size),
        }
    }

    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }
}

impl ThreadFactory for StdThreadFactory {
    fn new_thread(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder.spawn(body)
    }
}
