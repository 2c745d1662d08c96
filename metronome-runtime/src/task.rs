//! A single schedulable task and its state machine.
//!
//! ```text
//! Idle --start--> Armed --timer--> Running --+--> Armed     (recurring)
//!  ^                |                 |       +--> Terminal  (once)
//!  +------stop------+                 |
//!  +------stop (after the run)--------+
//! ```
//!
//! The armed timer is a [`CancellationToken`] owned by the task. A run is
//! never interrupted: `stop` cancels the next scheduling decision and waits
//! for the run in flight to finish.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::descriptor::JobDescriptor;
use crate::error::{Result, TaskError};
use crate::job::{Job, JobContext};
use crate::registry::{Registry, RegistryShared};
use crate::time_unit::{
    parse_period, parse_time_of_day, seconds_until, Period, PeriodSpec, TimeOfDay,
};

/// When a task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every day at this time in the task's timezone.
    TimeOfDay(TimeOfDay),
    /// This long after the previous run finished.
    Period(Period),
}

impl Schedule {
    /// Resolve the descriptor's schedule fields. Exactly one must be present and valid.
    pub fn from_specs(time: Option<&str>, period: Option<&PeriodSpec>) -> Result<Self> {
        let time_of_day = time
            .map(|spec| {
                parse_time_of_day(spec).ok_or_else(|| TaskError::InvalidTime(spec.to_string()))
            })
            .transpose()?;
        let period = period
            .map(|spec| {
                parse_period(spec).ok_or_else(|| TaskError::InvalidPeriod(spec.to_string()))
            })
            .transpose()?;

        match (time_of_day, period) {
            (Some(time_of_day), None) => Ok(Schedule::TimeOfDay(time_of_day)),
            (None, Some(period)) => Ok(Schedule::Period(period)),
            (Some(_), Some(_)) => Err(TaskError::AmbiguousSchedule),
            (None, None) => Err(TaskError::MissingSchedule),
        }
    }
}

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Idle,
    /// A timer is pending.
    Armed,
    /// Jobs are executing, or the post-run settle delay is elapsing.
    Running,
    /// A single-shot task that has run. Never leaves this phase.
    Terminal,
}

#[derive(Debug)]
struct TaskState {
    phase: TaskPhase,
    timer: Option<CancellationToken>,
    stopping: bool,
    runs: u64,
}

struct TaskInner {
    id: String,
    name: Option<String>,
    description: Option<String>,
    schedule: Schedule,
    once: bool,
    timezone: Tz,
    jobs: Vec<Job>,
    args: Arc<[Value]>,
    settle_delay: Duration,
    registry: Weak<RegistryShared>,
    state: watch::Sender<TaskState>,
}

/// Handle to a task. Clones share the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Build a task from a descriptor. Does not start it.
    ///
    /// `timezone` applies unless the descriptor names its own.
    pub fn new(descriptor: JobDescriptor, registry: &Registry, timezone: Tz) -> Result<Self> {
        let JobDescriptor {
            id,
            name,
            description,
            time,
            period,
            jobs,
            args,
            once,
            timezone: zone,
        } = descriptor;

        let schedule = Schedule::from_specs(time.as_deref(), period.as_ref())?;
        if jobs.is_empty() {
            return Err(TaskError::MissingJobs);
        }
        let timezone = match zone {
            Some(zone) => parse_timezone(&zone)?,
            None => timezone,
        };

        let (state, _) = watch::channel(TaskState {
            phase: TaskPhase::Idle,
            timer: None,
            stopping: false,
            runs: 0,
        });

        Ok(Self {
            inner: Arc::new(TaskInner {
                id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                name,
                description,
                schedule,
                once,
                timezone,
                jobs,
                args: args.into(),
                settle_delay: registry.settle_delay(),
                registry: Arc::downgrade(&registry.shared),
                state,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Name for log lines.
    pub fn display_name(&self) -> &str {
        self.inner.name.as_deref().unwrap_or("nameless task")
    }

    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    pub fn schedule(&self) -> Schedule {
        self.inner.schedule
    }

    pub fn is_once(&self) -> bool {
        self.inner.once
    }

    pub fn timezone(&self) -> Tz {
        self.inner.timezone
    }

    pub fn phase(&self) -> TaskPhase {
        self.inner.state.borrow().phase
    }

    /// Number of runs started so far.
    pub fn run_count(&self) -> u64 {
        self.inner.state.borrow().runs
    }

    /// Arm the timer for the next run.
    ///
    /// Does nothing while a stop is in progress, while already armed or
    /// running, or once the task is terminal. Must be called within a tokio
    /// runtime.
    pub fn start(&self) {
        if !self.arm(TaskPhase::Idle) {
            debug!(task = %self.display_name(), phase = ?self.phase(), "start ignored");
        }
    }

    /// Stop the task and wait until it is quiescent.
    ///
    /// A pending timer is cancelled right away. A run in flight is allowed to
    /// finish first; it will not re-arm. Concurrent calls all resolve once the
    /// task is quiescent.
    pub async fn stop(&self) {
        self.inner.state.send_modify(|state| {
            state.stopping = true;
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            if state.phase == TaskPhase::Armed {
                state.phase = TaskPhase::Idle;
            }
        });

        let mut state = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = state
            .wait_for(|state| state.phase != TaskPhase::Running)
            .await;

        self.inner.state.send_modify(|state| state.stopping = false);
        debug!(task = %self.display_name(), "task stopped");
    }

    /// Move from `from` to Armed and spawn the timer. False if the transition is not allowed.
    fn arm(&self, from: TaskPhase) -> bool {
        // Every handle to the registry is gone: nothing can stop this task any more.
        if self.inner.registry.strong_count() == 0 {
            return false;
        }
        let timer = CancellationToken::new();
        let armed = self.inner.state.send_if_modified(|state| {
            if state.stopping || state.phase != from {
                return false;
            }
            state.phase = TaskPhase::Armed;
            state.timer = Some(timer.clone());
            true
        });
        if !armed {
            return false;
        }

        let delay = self.next_delay();
        info!(
            task = %self.display_name(),
            task_id = %self.id(),
            seconds = delay.as_secs(),
            "{} seconds until {}",
            delay.as_secs(),
            self.display_name()
        );

        let task = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => task.run(timer.clone()).await,
            }
        });
        true
    }

    fn next_delay(&self) -> Duration {
        match self.inner.schedule {
            Schedule::TimeOfDay(time_of_day) => {
                let seconds = seconds_until(time_of_day, Utc::now(), self.inner.timezone);
                Duration::from_secs(u64::from(seconds))
            }
            Schedule::Period(period) => period.as_duration(),
        }
    }

    /// Timer callback: execute the jobs, then re-arm or finish.
    async fn run(self, timer: CancellationToken) {
        let began = self.inner.state.send_if_modified(|state| {
            // A stop that cancelled this timer wins, even if the sleep already elapsed.
            if timer.is_cancelled() || state.phase != TaskPhase::Armed {
                return false;
            }
            state.timer = None;
            state.phase = TaskPhase::Running;
            state.runs += 1;
            true
        });
        if !began {
            return;
        }

        if let Some(failure) = self.execute().await {
            self.report(failure);
        }

        if self.inner.once {
            self.inner
                .state
                .send_modify(|state| state.phase = TaskPhase::Terminal);
            debug!(task = %self.display_name(), "single-shot task finished");
            return;
        }

        if matches!(self.inner.schedule, Schedule::TimeOfDay(_)) {
            self.settle().await;
        }

        if !self.arm(TaskPhase::Running) {
            self.inner.state.send_modify(|state| {
                if state.phase == TaskPhase::Running {
                    state.phase = TaskPhase::Idle;
                }
            });
        }
    }

    /// Run every job in order. The first failure ends the run and is returned.
    async fn execute(&self) -> Option<anyhow::Error> {
        let registry = self.registry();
        let app = match &registry {
            Some(registry) => registry.app().await,
            None => None,
        };
        let context = JobContext {
            args: Arc::clone(&self.inner.args),
            task: self.clone(),
            registry,
            app,
        };

        for (index, job) in self.inner.jobs.iter().enumerate() {
            let call = AssertUnwindSafe(async { job(context.clone()).await });
            let failure = match call.catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(panic) => anyhow::anyhow!("job panicked: {}", panic_message(panic.as_ref())),
            };
            return Some(
                failure.context(format!("job {} of {}", index + 1, self.inner.jobs.len())),
            );
        }
        None
    }

    /// Hand a failure to the registry's error sink on its own tokio task.
    ///
    /// The run does not wait for `task-error` listeners, so a listener may
    /// stop this very task.
    fn report(&self, failure: anyhow::Error) {
        match self.registry() {
            Some(registry) => {
                let task = self.clone();
                tokio::spawn(async move { registry.error(failure, &task).await });
            }
            None => error!(
                task = %self.display_name(),
                error = %format!("{failure:#}"),
                "task failed after its registry was dropped"
            ),
        }
    }

    /// Pause before re-arming a time-of-day task so the next delay is computed
    /// from a clock read taken after the run. A stop request cuts it short.
    async fn settle(&self) {
        let mut state = self.inner.state.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.inner.settle_delay) => {}
            _ = state.wait_for(|state| state.stopping) => {}
        }
    }

    fn registry(&self) -> Option<Registry> {
        self.inner.registry.upgrade().map(Registry::from_shared)
    }

    /// Cancel a pending timer without waiting. Used when the registry goes away.
    pub(crate) fn detach(&self) {
        self.inner.state.send_modify(|state| {
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            if state.phase == TaskPhase::Armed {
                state.phase = TaskPhase::Idle;
            }
        });
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("schedule", &self.inner.schedule)
            .field("once", &self.inner.once)
            .field("timezone", &self.inner.timezone)
            .field("phase", &self.phase())
            .finish()
    }
}

pub(crate) fn parse_timezone(zone: &str) -> Result<Tz> {
    zone.parse::<Tz>()
        .map_err(|_| TaskError::InvalidTimezone(zone.to_string()))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
