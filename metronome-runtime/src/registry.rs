//! The task registry.
//!
//! A registry is driven by the host through three phases:
//!
//! 1. [`Registry::up`] binds settings and the application context, runs the
//!    `before` hooks, materializes every buffered descriptor and discovers
//!    descriptor files in the registered volumes.
//! 2. [`Registry::after`] arms every task and runs the `after` hooks.
//! 3. [`Registry::down`] stops every task, waiting for runs in flight, and
//!    forgets them.
//!
//! Descriptors added before `up` are buffered; afterwards they become tasks
//! immediately.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::descriptor::JobDescriptor;
use crate::discovery::{DescriptorSource, DirectorySource};
use crate::error::{Result, TaskError};
use crate::extension::Extension;
use crate::hooks::{Hooks, TaskFailure};
use crate::job::{AppContext, JobCatalog};
use crate::settings::{RegistrySettings, SettingsSource};
use crate::task::{parse_timezone, Task};

const DEFAULT_NAME: &str = "tasks";
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// What the host hands over in [`Registry::up`].
#[derive(Clone)]
pub struct Dependencies {
    settings: Arc<dyn SettingsSource>,
    app: Option<AppContext>,
}

impl Dependencies {
    pub fn new(settings: impl SettingsSource + 'static) -> Self {
        Self {
            settings: Arc::new(settings),
            app: None,
        }
    }

    /// Application state made available to jobs through `JobContext::app`.
    pub fn with_app<T: Any + Send + Sync>(mut self, app: T) -> Self {
        self.app = Some(Arc::new(app));
        self
    }
}

impl Default for Dependencies {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

#[derive(Clone)]
struct Bound {
    settings: Arc<dyn SettingsSource>,
    timezone: Tz,
}

enum Lifecycle {
    NotReady { buffer: Vec<JobDescriptor> },
    Ready(Bound),
}

/// Tasks by id, iterated in insertion order.
#[derive(Default)]
struct TaskMap {
    by_id: HashMap<String, Task>,
    order: Vec<String>,
}

impl TaskMap {
    fn insert(&mut self, task: Task) -> Result<()> {
        if self.by_id.contains_key(task.id()) {
            return Err(TaskError::DuplicateTask(task.id().to_string()));
        }
        self.order.push(task.id().to_string());
        self.by_id.insert(task.id().to_string(), task);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&Task> {
        self.by_id.get(id)
    }

    fn ordered(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
    }
}

pub(crate) struct RegistryShared {
    name: String,
    tasks: RwLock<TaskMap>,
    volumes: RwLock<Vec<PathBuf>>,
    lifecycle: RwLock<Lifecycle>,
    app: RwLock<Option<AppContext>>,
    hooks: Hooks,
    source: Arc<dyn DescriptorSource>,
    settle_delay_ms: AtomicU64,
}

impl Drop for RegistryShared {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for task in tasks.by_id.values() {
            task.detach();
        }
        if !tasks.by_id.is_empty() {
            debug!(
                registry = %self.name,
                count = tasks.len(),
                "registry dropped, timers cancelled"
            );
        }
    }
}

/// Owns a collection of tasks and drives them through the host lifecycle.
///
/// Cheap to clone; clones share the same tasks. Call [`Registry::down`] to
/// stop gracefully. Dropping the last clone without it cancels pending timers
/// and keeps tasks from re-arming, but does not wait for runs in flight.
#[derive(Clone)]
pub struct Registry {
    pub(crate) shared: Arc<RegistryShared>,
}

impl Registry {
    /// A registry with the default discovery source and no volumes.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder().name(name).build()
    }

    /// Create a new builder for Registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub(crate) fn from_shared(shared: Arc<RegistryShared>) -> Self {
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn hooks(&self) -> &Hooks {
        &self.shared.hooks
    }

    /// Pause before a time-of-day task re-arms after a run.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.shared.settle_delay_ms.load(Ordering::Relaxed))
    }

    /// Register a descriptor.
    ///
    /// Before `up` the descriptor is buffered and `None` is returned. After
    /// `up` any settings override for the descriptor's name is merged in and
    /// the task is built and stored, but not started. A task disabled in
    /// settings is skipped and also yields `None`.
    pub async fn add(&self, mut descriptor: JobDescriptor) -> Result<Option<Task>> {
        let bound = {
            let mut lifecycle = self.shared.lifecycle.write().await;
            match &mut *lifecycle {
                Lifecycle::NotReady { buffer } => {
                    debug!(registry = %self.name(), task = ?descriptor.name, "descriptor buffered");
                    buffer.push(descriptor);
                    return Ok(None);
                }
                Lifecycle::Ready(bound) => bound.clone(),
            }
        };

        if let Some(name) = descriptor.name.clone() {
            if let Some(task_override) = bound.settings.task_override(self.name(), &name) {
                if task_override.is_disabled() {
                    info!(registry = %self.name(), task = %name, "task disabled in settings");
                    return Ok(None);
                }
                task_override.apply(&mut descriptor);
            }
        }

        let task = Task::new(descriptor, self, bound.timezone)?;
        self.shared.tasks.write().await.insert(task.clone())?;
        debug!(
            registry = %self.name(),
            task = %task.display_name(),
            task_id = %task.id(),
            "task added"
        );
        Ok(Some(task))
    }

    /// Arm `task` and hand it back.
    pub fn start(&self, task: &Task) -> Task {
        task.start();
        task.clone()
    }

    /// Stop the task with this id and wait for it to become quiescent.
    pub async fn stop(&self, id: &str) -> Option<Task> {
        let task = self.get(id).await?;
        task.stop().await;
        Some(task)
    }

    /// Stop every task concurrently and wait for all of them.
    pub async fn stop_all(&self) {
        let tasks = self.tasks().await;
        join_all(tasks.iter().map(Task::stop)).await;
        debug!(registry = %self.name(), count = tasks.len(), "all tasks stopped");
    }

    /// Error sink for job failures: log, then notify `task-error` listeners.
    pub async fn error(&self, err: anyhow::Error, task: &Task) {
        error!(
            registry = %self.name(),
            task = %task.display_name(),
            task_id = %task.id(),
            error = %format!("{err:#}"),
            "task {} failed",
            task.display_name()
        );
        self.shared
            .hooks
            .run_task_error(TaskFailure {
                error: Arc::new(err),
                task: task.clone(),
            })
            .await;
    }

    /// Bind dependencies and materialize every known descriptor.
    ///
    /// Fails only if the settings name an unknown default timezone, in which
    /// case nothing changes. Descriptors that fail to build are logged and
    /// skipped.
    pub async fn up(&self, dependencies: Dependencies) -> Result<()> {
        let Dependencies { settings, app } = dependencies;

        let timezone = match settings.default_timezone(self.name()) {
            Some(zone) => parse_timezone(&zone)?,
            None => Tz::UTC,
        };
        if let Some(delay) = settings.settle_delay(self.name()) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.shared.settle_delay_ms.store(millis, Ordering::Relaxed);
        }
        *self.shared.app.write().await = app;

        self.shared.hooks.run_before(self).await;

        let buffered = {
            let mut lifecycle = self.shared.lifecycle.write().await;
            let ready = Lifecycle::Ready(Bound { settings, timezone });
            match std::mem::replace(&mut *lifecycle, ready) {
                Lifecycle::NotReady { buffer } => buffer,
                Lifecycle::Ready(_) => {
                    warn!(registry = %self.name(), "registry was already up, settings rebound");
                    Vec::new()
                }
            }
        };

        for descriptor in buffered {
            self.add_logged(descriptor).await;
        }

        let volumes = self.volumes().await;
        for dir in volumes {
            let source = Arc::clone(&self.shared.source);
            let path = dir.clone();
            match tokio::task::spawn_blocking(move || source.discover(&path)).await {
                Ok(Ok(descriptors)) => {
                    for descriptor in descriptors {
                        self.add_logged(descriptor).await;
                    }
                }
                Ok(Err(err)) => {
                    warn!(
                        registry = %self.name(),
                        volume = %dir.display(),
                        error = %err,
                        "skipping task volume"
                    );
                }
                Err(err) => {
                    error!(
                        registry = %self.name(),
                        volume = %dir.display(),
                        error = %err,
                        "task discovery panicked"
                    );
                }
            }
        }

        info!(
            registry = %self.name(),
            tasks = self.len().await,
            timezone = %timezone,
            "registry is up"
        );
        Ok(())
    }

    async fn add_logged(&self, descriptor: JobDescriptor) {
        let name = descriptor.name.clone();
        if let Err(err) = self.add(descriptor).await {
            error!(registry = %self.name(), task = ?name, error = %err, "failed to add task");
        }
    }

    /// Arm every task in insertion order, then run the `after` hooks.
    pub async fn after(&self) {
        for task in self.tasks().await {
            task.start();
        }
        self.shared.hooks.run_after(self).await;
    }

    /// Stop every task and go back to buffering.
    ///
    /// Descriptors buffered by a registry that was never up are kept.
    pub async fn down(&self) {
        self.stop_all().await;
        self.shared.tasks.write().await.clear();

        let mut lifecycle = self.shared.lifecycle.write().await;
        if let Lifecycle::Ready(_) = &*lifecycle {
            *lifecycle = Lifecycle::NotReady { buffer: Vec::new() };
            *self.shared.app.write().await = None;
            info!(registry = %self.name(), "registry is down");
        }
    }

    /// Add the extension's volumes and register its hooks.
    pub async fn use_extension(&self, extension: Extension) {
        extension.register_hooks(&self.shared.hooks);
        self.shared
            .volumes
            .write()
            .await
            .extend(extension.volumes.iter().cloned());
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.shared.tasks.read().await.get(id).cloned()
    }

    /// Every task, in the order it was added.
    pub async fn tasks(&self) -> Vec<Task> {
        self.shared.tasks.read().await.ordered()
    }

    pub async fn len(&self) -> usize {
        self.shared.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.shared.lifecycle.read().await, Lifecycle::Ready(_))
    }

    pub async fn volumes(&self) -> Vec<PathBuf> {
        self.shared.volumes.read().await.clone()
    }

    /// The application context bound by `up`.
    pub async fn app(&self) -> Option<AppContext> {
        self.shared.app.read().await.clone()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.shared.name)
            .field("settle_delay", &self.settle_delay())
            .finish_non_exhaustive()
    }
}

/// Builder for Registry
#[derive(Default)]
pub struct RegistryBuilder {
    name: Option<String>,
    volumes: Vec<PathBuf>,
    settle_delay: Option<Duration>,
    catalog: Option<JobCatalog>,
    source: Option<Arc<dyn DescriptorSource>>,
    extensions: Vec<Extension>,
}

impl RegistryBuilder {
    /// Set the registry name, also the settings table it reads. Defaults to `tasks`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn volume(mut self, dir: impl Into<PathBuf>) -> Self {
        self.volumes.push(dir.into());
        self
    }

    pub fn volumes<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.volumes.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Pause before a time-of-day task re-arms. Settings may override it at `up`.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    /// Jobs that descriptor files may name. Defaults to the statically registered jobs.
    /// Ignored when a custom source is set.
    pub fn catalog(mut self, catalog: JobCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn source(mut self, source: impl DescriptorSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn build(self) -> Registry {
        let source = self.source.unwrap_or_else(|| {
            let catalog = self.catalog.unwrap_or_else(JobCatalog::registered);
            Arc::new(DirectorySource::new(catalog))
        });

        let hooks = Hooks::new();
        let mut volumes = self.volumes;
        for extension in &self.extensions {
            extension.register_hooks(&hooks);
            volumes.extend(extension.volumes.iter().cloned());
        }

        let settle_delay = self.settle_delay.unwrap_or(DEFAULT_SETTLE_DELAY);

        Registry {
            shared: Arc::new(RegistryShared {
                name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
                tasks: RwLock::new(TaskMap::default()),
                volumes: RwLock::new(volumes),
                lifecycle: RwLock::new(Lifecycle::NotReady { buffer: Vec::new() }),
                app: RwLock::new(None),
                hooks,
                source,
                settle_delay_ms: AtomicU64::new(
                    u64::try_from(settle_delay.as_millis()).unwrap_or(u64::MAX),
                ),
            }),
        }
    }
}
