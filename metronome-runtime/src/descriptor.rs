use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::job::{Job, JobCatalog};
use crate::time_unit::PeriodSpec;

/// Definition of a task as handed to the registry.
///
/// Not validated on its own: `Task::new` checks the schedule and job list.
#[derive(Clone, Default)]
pub struct JobDescriptor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// `HH[:MM[:SS]]` in the task's timezone.
    pub time: Option<String>,
    pub period: Option<PeriodSpec>,
    pub jobs: Vec<Job>,
    pub args: Vec<Value>,
    /// Run once and never re-arm.
    pub once: bool,
    /// IANA timezone name, the registry default applies when unset.
    pub timezone: Option<String>,
}

impl JobDescriptor {
    /// Create a new builder for JobDescriptor
    pub fn builder() -> JobDescriptorBuilder {
        JobDescriptorBuilder {
            descriptor: JobDescriptor::default(),
        }
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("time", &self.time)
            .field("period", &self.period)
            .field("jobs", &self.jobs.len())
            .field("args", &self.args)
            .field("once", &self.once)
            .field("timezone", &self.timezone)
            .finish()
    }
}

/// Builder for JobDescriptor
pub struct JobDescriptorBuilder {
    descriptor: JobDescriptor,
}

impl JobDescriptorBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.descriptor.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = Some(description.into());
        self
    }

    pub fn time(mut self, time: impl Into<String>) -> Self {
        self.descriptor.time = Some(time.into());
        self
    }

    pub fn period(mut self, period: impl Into<PeriodSpec>) -> Self {
        self.descriptor.period = Some(period.into());
        self
    }

    /// Append a job to the sequence.
    pub fn job(mut self, job: Job) -> Self {
        self.descriptor.jobs.push(job);
        self
    }

    pub fn jobs(mut self, jobs: impl IntoIterator<Item = Job>) -> Self {
        self.descriptor.jobs.extend(jobs);
        self
    }

    /// Append an argument passed to every job call.
    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.descriptor.args.push(arg.into());
        self
    }

    pub fn once(mut self) -> Self {
        self.descriptor.once = true;
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.descriptor.timezone = Some(timezone.into());
        self
    }

    pub fn build(self) -> JobDescriptor {
        self.descriptor
    }
}

/// One job name or a list of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JobNames {
    One(String),
    Many(Vec<String>),
}

impl JobNames {
    fn into_vec(self) -> Vec<String> {
        match self {
            JobNames::One(name) => vec![name],
            JobNames::Many(names) => names,
        }
    }
}

/// A descriptor as written in a task file.
///
/// Accepts the legacy spellings `func`, `oneTime` and `arguments`. Jobs are
/// referenced by name and resolved against a [`JobCatalog`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub period: Option<PeriodSpec>,
    #[serde(default)]
    pub jobs: Option<JobNames>,
    /// Appended after `jobs`.
    #[serde(default)]
    pub func: Option<JobNames>,
    #[serde(default, alias = "arguments")]
    pub args: Vec<Value>,
    #[serde(default, alias = "oneTime", alias = "onetime", alias = "one_time")]
    pub once: bool,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl RawDescriptor {
    /// Job names in invocation order.
    pub fn job_names(&self) -> Vec<String> {
        self.jobs
            .iter()
            .chain(self.func.iter())
            .cloned()
            .flat_map(JobNames::into_vec)
            .collect()
    }

    pub fn into_descriptor(self, catalog: &JobCatalog) -> Result<JobDescriptor> {
        let jobs = catalog.resolve(&self.job_names())?;
        Ok(JobDescriptor {
            id: self.id,
            name: self.name,
            description: self.description,
            time: self.time,
            period: self.period,
            jobs,
            args: self.args,
            once: self.once,
            timezone: self.timezone,
        })
    }
}
