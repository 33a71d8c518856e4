//! Helper types and functions to handle groups of threads.

use std::{
    fmt::{Debug, Display},
    io, thread,
    thread::{Builder, JoinHandle},
};

/// A group of named threads that are joined together.
///
/// ```
/// use kassenbuch::thread_group::ThreadGroup;
///
/// let mut thread_group = ThreadGroup::new();
///
/// thread_group
///     .spawn("worker 1", move || {
///         // This is thread 1
///     })
///     .unwrap();
///
/// thread_group
///     .spawn("worker 2", move || {
///         // This is thread 2
///     })
///     .unwrap();
///
/// assert_eq!(thread_group.len(), 2);
/// thread_group.join_and_log();
/// ```
#[derive(Debug)]
pub struct ThreadGroup<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> Default for ThreadGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadGroup<T> {
    /// Create a new thread group.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawn a new thread named `name` in this thread group.
    pub fn spawn<F>(&mut self, name: impl Display, f: F) -> io::Result<()>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = Builder::new().name(name.to_string()).spawn(f)?;
        self.handles.push(handle);
        Ok(())
    }

    /// Number of threads in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no thread was spawned in this group.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Join all threads in this thread group.
    pub fn join(self) -> impl Iterator<Item = (String, thread::Result<T>)> {
        self.handles.into_iter().map(|handle| {
            (
                handle.thread().name().unwrap_or("<unnamed>").to_string(),
                handle.join(),
            )
        })
    }
}

impl<T> ThreadGroup<T>
where
    T: Debug,
{
    /// Join all threads in this thread group and log how each of them ended.
    pub fn join_and_log(self) {
        for (name, result) in self.join() {
            match result {
                Err(_) => log::error!("Thread {} panicked.", name),
                Ok(value) => log::debug!("Thread {} ended: {:?}", name, value),
            }
        }
    }
}
