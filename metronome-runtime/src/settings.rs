use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::warn;

use crate::descriptor::JobDescriptor;
use crate::error::Result;
use crate::time_unit::PeriodSpec;

const ENV_PREFIX: &str = "METRONOME";

/// Load settings from a specific TOML file, layered with `METRONOME_*` environment variables
///
/// Nested keys are separated by a double underscore, e.g.
/// `METRONOME_TASKS__TIMEZONE=Europe/Moscow`.
pub fn load_toml_settings<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_settings(path.as_ref(), FileFormat::Toml)
}

/// Load settings from a specific YAML file, layered with `METRONOME_*` environment variables
pub fn load_yaml_settings<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_settings(path.as_ref(), FileFormat::Yaml)
}

fn load_settings(path: &Path, format: FileFormat) -> Result<Config> {
    let config = Config::builder()
        .add_source(File::from(path).format(format))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(config)
}

/// Per-task settings merged onto a descriptor before the task is built.
///
/// Only schedule fields can be overridden, never the jobs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskOverride {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub period: Option<PeriodSpec>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// `false` keeps the task from being registered at all.
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl TaskOverride {
    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }

    /// Merge onto `descriptor`. A time or period replaces the whole schedule.
    pub fn apply(&self, descriptor: &mut JobDescriptor) {
        if let Some(time) = &self.time {
            descriptor.time = Some(time.clone());
            descriptor.period = None;
        } else if let Some(period) = &self.period {
            descriptor.period = Some(period.clone());
            descriptor.time = None;
        }
        if let Some(timezone) = &self.timezone {
            descriptor.timezone = Some(timezone.clone());
        }
    }
}

/// Settings scoped to one registry.
///
/// ```toml
/// [tasks]
/// timezone = "Europe/Moscow"
/// settle_delay_ms = 1000
///
/// [tasks.tasks.nightly-report]
/// time = "03:30"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub settle_delay_ms: Option<u64>,
    #[serde(default)]
    pub tasks: HashMap<String, TaskOverride>,
}

impl RegistrySettings {
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_task(mut self, name: impl Into<String>, task: TaskOverride) -> Self {
        self.tasks.insert(name.into(), task);
        self
    }

    fn task(&self, name: &str) -> Option<&TaskOverride> {
        // config may fold key case
        self.tasks
            .get(name)
            .or_else(|| self.tasks.get(&name.to_lowercase()))
    }
}

/// Source of per-task overrides and registry-wide defaults.
pub trait SettingsSource: Send + Sync {
    /// Override for the task named `task` in registry `registry`, if any.
    fn task_override(&self, registry: &str, task: &str) -> Option<TaskOverride>;

    /// Timezone used by tasks that do not name their own.
    fn default_timezone(&self, registry: &str) -> Option<String>;

    /// Pause before re-arming a time-of-day task after a run.
    fn settle_delay(&self, _registry: &str) -> Option<Duration> {
        None
    }
}

impl SettingsSource for RegistrySettings {
    fn task_override(&self, _registry: &str, task: &str) -> Option<TaskOverride> {
        self.task(task).cloned()
    }

    fn default_timezone(&self, _registry: &str) -> Option<String> {
        self.timezone.clone()
    }

    fn settle_delay(&self, _registry: &str) -> Option<Duration> {
        self.settle_delay_ms.map(Duration::from_millis)
    }
}

impl SettingsSource for Config {
    fn task_override(&self, registry: &str, task: &str) -> Option<TaskOverride> {
        registry_settings(self, registry).task(task).cloned()
    }

    fn default_timezone(&self, registry: &str) -> Option<String> {
        registry_settings(self, registry).timezone
    }

    fn settle_delay(&self, registry: &str) -> Option<Duration> {
        registry_settings(self, registry)
            .settle_delay_ms
            .map(Duration::from_millis)
    }
}

/// Read the `registry` table, treating a missing or malformed table as empty.
fn registry_settings(config: &Config, registry: &str) -> RegistrySettings {
    match config.get::<RegistrySettings>(registry) {
        Ok(settings) => settings,
        Err(ConfigError::NotFound(_)) => RegistrySettings::default(),
        Err(err) => {
            warn!(registry, error = %err, "ignoring malformed registry settings");
            RegistrySettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job;

    const SETTINGS: &str = r#"
        [tasks]
        timezone = "Europe/Moscow"
        settle_delay_ms = 250

        [tasks.tasks.report]
        time = "04:15"

        [tasks.tasks.cleanup]
        period = "10m"
        timezone = "Asia/Jakarta"

        [tasks.tasks.legacy]
        enabled = false
    "#;

    fn config() -> Config {
        Config::builder()
            .add_source(File::from_str(SETTINGS, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn reads_registry_defaults_from_config() {
        let config = config();
        assert_eq!(
            config.default_timezone("tasks").as_deref(),
            Some("Europe/Moscow")
        );
        assert_eq!(
            config.settle_delay("tasks"),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn reads_task_overrides_from_config() {
        let config = config();

        let report = config.task_override("tasks", "report").unwrap();
        assert_eq!(report.time.as_deref(), Some("04:15"));

        let cleanup = config.task_override("tasks", "cleanup").unwrap();
        assert_eq!(cleanup.period, Some(PeriodSpec::Text("10m".into())));
        assert_eq!(cleanup.timezone.as_deref(), Some("Asia/Jakarta"));

        assert!(config.task_override("tasks", "legacy").unwrap().is_disabled());
        assert!(config.task_override("tasks", "unknown").is_none());
    }

    #[test]
    fn missing_registry_table_means_no_overrides() {
        let config = config();
        assert!(config.default_timezone("other").is_none());
        assert!(config.task_override("other", "report").is_none());
    }

    #[test]
    fn override_replaces_schedule_but_not_jobs() {
        let mut descriptor = JobDescriptor::builder()
            .name("report")
            .period(60)
            .job(job(|_| async { Ok(()) }))
            .build();

        TaskOverride {
            time: Some("04:15".into()),
            timezone: Some("Asia/Jakarta".into()),
            ..Default::default()
        }
        .apply(&mut descriptor);

        assert_eq!(descriptor.time.as_deref(), Some("04:15"));
        assert_eq!(descriptor.period, None);
        assert_eq!(descriptor.timezone.as_deref(), Some("Asia/Jakarta"));
        assert_eq!(descriptor.jobs.len(), 1);
    }

    #[test]
    fn in_memory_settings_act_as_a_source() {
        let settings = RegistrySettings::default()
            .with_timezone("UTC")
            .with_task(
                "report",
                TaskOverride {
                    period: Some(PeriodSpec::Seconds(5)),
                    ..Default::default()
                },
            );

        assert_eq!(settings.default_timezone("any").as_deref(), Some("UTC"));
        assert_eq!(
            settings.task_override("any", "report").unwrap().period,
            Some(PeriodSpec::Seconds(5))
        );
        assert!(settings.settle_delay("any").is_none());
    }
}
