//! # Metronome - In-process recurring tasks for Rust
//!
//! Run sequences of async jobs at a fixed time of day or at a fixed interval,
//! with a graceful shutdown that never interrupts a job mid-execution.
//!
//! ## Features
//!
//! - **Time of day**: `"03:30"` fires every day at 03:30 in the task's timezone
//! - **Interval**: `90`, `"90s"`, `"5m"`, `"2h"`, `"1d"` or `"1w"` between runs
//! - **Single-shot**: run once and stay finished
//! - **Settings overrides**: change a task's schedule or disable it from a config file
//! - **Descriptor files**: drop TOML/YAML/JSON task files into a volume directory
//! - **Hooks**: `before`, `after` and `task-error` listeners
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metronome::{job, Dependencies, JobDescriptor, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new("tasks");
//!
//!     registry
//!         .add(
//!             JobDescriptor::builder()
//!                 .name("heartbeat")
//!                 .period("30s")
//!                 .job(job(|ctx| async move {
//!                     println!("{} is alive", ctx.task().display_name());
//!                     Ok(())
//!                 }))
//!                 .build(),
//!         )
//!         .await?;
//!
//!     registry.up(Dependencies::default()).await?;
//!     registry.after().await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     registry.down().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Create `config/application.toml`:
//!
//! ```toml
//! [tasks]
//! timezone = "Europe/Moscow"
//!
//! [tasks.tasks.heartbeat]
//! period = "1m"
//!
//! [tasks.tasks.legacy-cleanup]
//! enabled = false
//! ```
//!
//! and hand it to the registry with
//! `Dependencies::new(load_toml_settings("config/application.toml")?)`.
//!
//! You can also use environment variables with the `METRONOME_` prefix:
//!
//! ```bash
//! export METRONOME_TASKS__TIMEZONE=Asia/Jakarta
//! ```

// Re-export core types
pub use metronome_runtime::{
    job, load_toml_settings, load_yaml_settings, parse_period, parse_time_of_day, seconds_until,
    AppContext, Dependencies, DescriptorSource, DirectorySource, ErrorHook, Extension, HookFuture,
    HookPoint, Hooks, Job, JobCatalog, JobContext, JobDescriptor, JobDescriptorBuilder,
    JobFuture, JobNames, LifecycleHook, NamedJob, Period, PeriodSpec, RawDescriptor, Registry,
    RegistryBuilder, RegistrySettings, Result, Schedule, SettingsSource, Task, TaskError,
    TaskFailure, TaskOverride, TaskPhase, TimeOfDay, TimeUnit, JOBS, SECONDS_PER_DAY,
};

// Make metronome_runtime available for static job registration
pub use metronome_runtime;
pub use metronome_runtime::linkme;
