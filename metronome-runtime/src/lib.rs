//! Metronome Runtime - Core runtime for in-process recurring tasks
//!
//! This crate provides the task state machine, the task registry with its
//! `up` / `after` / `down` host lifecycle, descriptor discovery and settings
//! overrides.

mod descriptor;
mod discovery;
mod error;
mod extension;
mod hooks;
mod job;
mod registry;
mod settings;
mod task;
mod time_unit;

// Re-export public API
pub use descriptor::{JobDescriptor, JobDescriptorBuilder, JobNames, RawDescriptor};
pub use discovery::{DescriptorSource, DirectorySource};
pub use error::{Result, TaskError};
pub use extension::Extension;
pub use hooks::{ErrorHook, HookFuture, HookPoint, Hooks, LifecycleHook, TaskFailure};
pub use job::{job, AppContext, Job, JobCatalog, JobContext, JobFuture, NamedJob, JOBS};
pub use linkme;
pub use registry::{Dependencies, Registry, RegistryBuilder};
pub use settings::{
    load_toml_settings, load_yaml_settings, RegistrySettings, SettingsSource, TaskOverride,
};
pub use task::{Schedule, Task, TaskPhase};
pub use time_unit::{
    parse_period, parse_time_of_day, seconds_until, Period, PeriodSpec, TimeOfDay, TimeUnit,
    SECONDS_PER_DAY,
};
