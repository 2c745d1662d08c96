use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::hooks::{ErrorHook, Hooks, LifecycleHook, TaskFailure};
use crate::registry::Registry;

/// A bundle of task volumes and hook listeners contributed by some other
/// part of the host.
///
/// ```rust
/// use metronome_runtime::Extension;
///
/// let reports = Extension::new()
///     .volume("/etc/reports/tasks")
///     .on_task_error(|failure| async move {
///         eprintln!("{} failed: {:#}", failure.task.display_name(), failure.error);
///     });
/// # let _ = reports;
/// ```
#[derive(Default, Clone)]
pub struct Extension {
    pub(crate) volumes: Vec<PathBuf>,
    before: Vec<LifecycleHook>,
    after: Vec<LifecycleHook>,
    task_error: Vec<ErrorHook>,
}

impl Extension {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory of task descriptor files.
    pub fn volume(mut self, dir: impl Into<PathBuf>) -> Self {
        self.volumes.push(dir.into());
        self
    }

    pub fn on_before<F, Fut>(mut self, listener: F) -> Self
    where
        F: Fn(Registry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.before
            .push(Arc::new(move |registry| Box::pin(listener(registry))));
        self
    }

    pub fn on_after<F, Fut>(mut self, listener: F) -> Self
    where
        F: Fn(Registry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.after
            .push(Arc::new(move |registry| Box::pin(listener(registry))));
        self
    }

    pub fn on_task_error<F, Fut>(mut self, listener: F) -> Self
    where
        F: Fn(TaskFailure) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.task_error
            .push(Arc::new(move |failure| Box::pin(listener(failure))));
        self
    }

    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// Attach the listeners to `hooks`, keeping their order.
    pub(crate) fn register_hooks(&self, hooks: &Hooks) {
        for hook in &self.before {
            hooks.add_before(Arc::clone(hook));
        }
        for hook in &self.after {
            hooks.add_after(Arc::clone(hook));
        }
        for hook in &self.task_error {
            hooks.add_task_error(Arc::clone(hook));
        }
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("volumes", &self.volumes)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("task_error", &self.task_error.len())
            .finish()
    }
}
