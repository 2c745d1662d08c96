use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, TaskError};
use crate::registry::Registry;
use crate::task::Task;

/// Future returned by a job invocation.
pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// A job function. Jobs of one task run in order, each awaited before the next.
pub type Job = Arc<dyn Fn(JobContext) -> JobFuture + Send + Sync>;

/// Shared application state handed to every job.
pub type AppContext = Arc<dyn Any + Send + Sync>;

/// Wrap an async closure into a [`Job`].
///
/// ```rust
/// use metronome_runtime::job;
///
/// let hello = job(|ctx| async move {
///     println!("hello from {}", ctx.task().display_name());
///     Ok(())
/// });
/// # let _ = hello;
/// ```
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Everything a job gets to see when it is invoked.
#[derive(Clone)]
pub struct JobContext {
    pub(crate) args: Arc<[Value]>,
    pub(crate) task: Task,
    pub(crate) registry: Option<Registry>,
    pub(crate) app: Option<AppContext>,
}

impl JobContext {
    /// Arguments from the task descriptor, in order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The task this run belongs to.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// The owning registry, if it is still alive.
    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    /// The application context bound during `up`, downcast to `T`.
    pub fn app<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.app.clone()?.downcast::<T>().ok()
    }
}

/// A job registered under a name so descriptor files can refer to it.
#[derive(Clone)]
pub struct NamedJob {
    pub name: &'static str,
    pub job: Job,
}

impl NamedJob {
    pub fn new(name: &'static str, job: Job) -> Self {
        Self { name, job }
    }
}

/// Global distributed slice for statically registered jobs
///
/// ```rust,ignore
/// #[linkme::distributed_slice(metronome_runtime::JOBS)]
/// static CLEANUP: fn() -> NamedJob = || NamedJob::new("cleanup", job(|_| async { Ok(()) }));
/// ```
#[linkme::distributed_slice]
pub static JOBS: [fn() -> NamedJob] = [..];

/// Name to job lookup used when descriptors are loaded from files.
#[derive(Clone, Default)]
pub struct JobCatalog {
    jobs: HashMap<String, Job>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding every job in [`JOBS`].
    pub fn registered() -> Self {
        let mut catalog = Self::new();
        for entry in JOBS.iter() {
            let named = entry();
            catalog.insert(named.name, named.job);
        }
        catalog
    }

    /// Add a job, replacing any job with the same name.
    pub fn insert(&mut self, name: impl Into<String>, job: Job) -> &mut Self {
        self.jobs.insert(name.into(), job);
        self
    }

    pub fn with(mut self, name: impl Into<String>, job: Job) -> Self {
        self.insert(name, job);
        self
    }

    pub fn get(&self, name: &str) -> Option<Job> {
        self.jobs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Resolve names in order. The first unknown name fails the whole list.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Job>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name)
                    .ok_or_else(|| TaskError::UnknownJob(name.to_string()))
            })
            .collect()
    }
}

impl std::fmt::Debug for JobCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("JobCatalog").field("jobs", &names).finish()
    }
}
