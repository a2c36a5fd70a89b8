//! Coordinator timing and fleet shape configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::validation::{Validatable, validate_positive};
use crate::error::ConfigResult;

/// Fleet coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of shards in the fleet; shard ids are `0..total_shards`
    #[serde(default = "default_total_shards")]
    pub total_shards: u32,

    /// Delay between two consecutive shard launches
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_throttle_interval")]
    pub throttle_interval: Duration,

    /// Delay between two staleness sweeps
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_health_check_interval")]
    pub health_check_interval: Duration,

    /// Age after which a shard's last report marks it unresponsive
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_stale_after")]
    pub stale_after: Duration,

    /// Per-shard offset applied to the initial report timestamps
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_boot_stagger")]
    pub boot_stagger: Duration,

    /// Restart shards whose process is missing or has exited
    #[serde(default = "crate::domains::utils::default_true")]
    pub crash_detection: bool,

    /// Shards run by hand; never launched at boot or by crash detection
    #[serde(default)]
    pub unmanaged_shards: Vec<u32>,

    /// Retry delays for shards whose launch failed
    #[serde(default)]
    pub spawn_backoff: BackoffSettings,
}

/// Exponential backoff applied to failed launches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_backoff_initial")]
    pub initial_delay: Duration,

    #[serde(with = "crate::domains::utils::serde_duration", default = "default_backoff_max")]
    pub max_delay: Duration,

    /// Spread retries by ±20% so shards failing together do not retry together
    #[serde(default)]
    pub jitter: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            total_shards: default_total_shards(),
            throttle_interval: default_throttle_interval(),
            health_check_interval: default_health_check_interval(),
            stale_after: default_stale_after(),
            boot_stagger: default_boot_stagger(),
            crash_detection: true,
            unmanaged_shards: Vec::new(),
            spawn_backoff: BackoffSettings::default(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay: default_backoff_initial(),
            max_delay: default_backoff_max(),
            jitter: false,
        }
    }
}

impl CoordinatorConfig {
    /// Whether the coordinator is responsible for launching this shard
    pub fn is_managed(&self, shard_id: u32) -> bool {
        !self.unmanaged_shards.contains(&shard_id)
    }
}

impl Validatable for CoordinatorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.total_shards, "total_shards", self.domain_name())?;
        validate_positive(
            self.throttle_interval.as_secs(),
            "throttle_interval",
            self.domain_name(),
        )?;
        validate_positive(
            self.health_check_interval.as_secs(),
            "health_check_interval",
            self.domain_name(),
        )?;
        validate_positive(self.stale_after.as_secs(), "stale_after", self.domain_name())?;

        if let Some(id) = self
            .unmanaged_shards
            .iter()
            .find(|id| **id >= self.total_shards)
        {
            return Err(self.validation_error(format!(
                "unmanaged shard {} is outside 0..{}",
                id, self.total_shards
            )));
        }

        self.spawn_backoff.validate()
    }

    fn domain_name(&self) -> &'static str {
        "coordinator"
    }
}

impl Validatable for BackoffSettings {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.initial_delay.as_secs(), "initial_delay", self.domain_name())?;
        if self.max_delay < self.initial_delay {
            return Err(self.validation_error("max_delay must not be smaller than initial_delay"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "coordinator.spawn_backoff"
    }
}

// Default value functions
fn default_total_shards() -> u32 {
    1
}

fn default_throttle_interval() -> Duration {
    Duration::from_secs(6)
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(30)
}

fn default_boot_stagger() -> Duration {
    Duration::from_secs(20)
}

fn default_backoff_initial() -> Duration {
    Duration::from_secs(6)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(300) // 5 minutes
}
