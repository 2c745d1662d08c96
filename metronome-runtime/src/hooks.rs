//! Extension hook points.
//!
//! Listeners run in registration order and each is awaited before the next
//! one starts. They cannot veto anything: hooks observe, the registry decides.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::registry::Registry;
use crate::task::Task;

pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Listener for the `before` and `after` lifecycle points.
pub type LifecycleHook = Arc<dyn Fn(Registry) -> HookFuture + Send + Sync>;

/// Listener for the `task-error` point.
pub type ErrorHook = Arc<dyn Fn(TaskFailure) -> HookFuture + Send + Sync>;

/// Named points the host can attach listeners to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Inside `up`, before the registry becomes ready.
    Before,
    /// At the end of `after`, once every task is armed.
    After,
    /// Whenever a job of any task fails.
    TaskError,
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HookPoint::Before => "before",
            HookPoint::After => "after",
            HookPoint::TaskError => "task-error",
        };
        write!(f, "{s}")
    }
}

/// A failed run as seen by `task-error` listeners.
#[derive(Clone)]
pub struct TaskFailure {
    pub error: Arc<anyhow::Error>,
    pub task: Task,
}

/// Listener lists for every hook point.
#[derive(Default)]
pub struct Hooks {
    before: RwLock<Vec<LifecycleHook>>,
    after: RwLock<Vec<LifecycleHook>>,
    task_error: RwLock<Vec<ErrorHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before<F, Fut>(&self, listener: F)
    where
        F: Fn(Registry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_before(Arc::new(move |registry| Box::pin(listener(registry))));
    }

    pub fn on_after<F, Fut>(&self, listener: F)
    where
        F: Fn(Registry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_after(Arc::new(move |registry| Box::pin(listener(registry))));
    }

    pub fn on_task_error<F, Fut>(&self, listener: F)
    where
        F: Fn(TaskFailure) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_task_error(Arc::new(move |failure| Box::pin(listener(failure))));
    }

    pub fn add_before(&self, hook: LifecycleHook) {
        write(&self.before).push(hook);
        debug!(point = %HookPoint::Before, "hook registered");
    }

    pub fn add_after(&self, hook: LifecycleHook) {
        write(&self.after).push(hook);
        debug!(point = %HookPoint::After, "hook registered");
    }

    pub fn add_task_error(&self, hook: ErrorHook) {
        write(&self.task_error).push(hook);
        debug!(point = %HookPoint::TaskError, "hook registered");
    }

    /// Number of listeners attached to `point`.
    pub fn count(&self, point: HookPoint) -> usize {
        match point {
            HookPoint::Before => read(&self.before).len(),
            HookPoint::After => read(&self.after).len(),
            HookPoint::TaskError => read(&self.task_error).len(),
        }
    }

    pub(crate) async fn run_before(&self, registry: &Registry) {
        let hooks = read(&self.before).clone();
        for hook in hooks {
            hook(registry.clone()).await;
        }
    }

    pub(crate) async fn run_after(&self, registry: &Registry) {
        let hooks = read(&self.after).clone();
        for hook in hooks {
            hook(registry.clone()).await;
        }
    }

    pub(crate) async fn run_task_error(&self, failure: TaskFailure) {
        let hooks = read(&self.task_error).clone();
        for hook in hooks {
            hook(failure.clone()).await;
        }
    }
}

// Poisoning is ignored: a push either happened or it did not.
fn read<T>(lock: &RwLock<Vec<T>>) -> std::sync::RwLockReadGuard<'_, Vec<T>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<Vec<T>>) -> std::sync::RwLockWriteGuard<'_, Vec<T>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
