//! Background job scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, ConfigResult, Configurable, Schema};

/// One recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Job name.
    #[config(required)]
    pub name: String,

    /// Cron expression with five or six fields.
    #[config(required)]
    pub cron: String,

    /// Whether the job runs.
    #[serde(with = "strata_core::de::boolish")]
    #[config(no_merge)]
    pub enabled: bool,
}

impl Configurable for ScheduleConfig {
    fn validate(&self) -> ConfigResult<()> {
        let fields = self.cron.split_whitespace().count();
        if !(5..=6).contains(&fields) {
            return Err(ConfigError::invalid_value(
                "cron",
                format!("expected 5 or 6 fields, found {fields}"),
            ));
        }
        Ok(())
    }
}

/// Jobs module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct JobsConfig {
    /// Worker pool size.
    #[config(min = 1, max = 256)]
    pub workers: u32,

    /// Queue poll interval.
    #[serde(with = "strata_core::de::duration")]
    pub poll_interval: Duration,

    /// Recurring jobs.
    #[config(nested)]
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_secs(1),
            schedules: Vec::new(),
        }
    }
}

impl Configurable for JobsConfig {}
