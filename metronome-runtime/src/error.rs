//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building tasks or talking to collaborators.
///
/// Job failures are not part of this enum: they are `anyhow::Error`s routed to
/// the registry's error sink and never returned to callers.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Neither a time of day nor a period was supplied.
    #[error("time and period of task are not defined")]
    MissingSchedule,

    /// Both a time of day and a period were supplied.
    #[error("task must have either a time of day or a period, not both")]
    AmbiguousSchedule,

    /// The time of day is not `HH[:MM[:SS]]`.
    #[error("invalid time of day: {0:?}")]
    InvalidTime(String),

    /// The period is neither a number nor a `<n><unit>` shorthand.
    #[error("invalid period: {0:?}")]
    InvalidPeriod(String),

    /// The job list is empty.
    #[error("jobs are not defined")]
    MissingJobs,

    /// A descriptor file names a job the catalog does not know.
    #[error("unknown job: {0:?}")]
    UnknownJob(String),

    /// The timezone is not a known IANA name.
    #[error("invalid timezone: {0:?}")]
    InvalidTimezone(String),

    /// A task with this id is already registered.
    #[error("task already registered: {0}")]
    DuplicateTask(String),

    /// Loading or reading settings failed.
    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// A task volume could not be read.
    #[error("cannot read task volume {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    /// True for errors caused by an invalid descriptor.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TaskError::MissingSchedule
                | TaskError::AmbiguousSchedule
                | TaskError::InvalidTime(_)
                | TaskError::InvalidPeriod(_)
                | TaskError::MissingJobs
                | TaskError::UnknownJob(_)
                | TaskError::InvalidTimezone(_)
        )
    }
}

/// Result type for task and registry operations.
pub type Result<T> = std::result::Result<T, TaskError>;
