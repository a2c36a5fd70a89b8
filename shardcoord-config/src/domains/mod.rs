//! Domain-specific configuration modules

pub mod coordinator;
pub mod logging;
pub mod process;
pub mod store;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ShardcoordConfig {
    /// Fleet shape and coordinator timing
    #[serde(default)]
    pub coordinator: coordinator::CoordinatorConfig,

    /// Worker launch template
    #[serde(default)]
    pub process: process::ProcessConfig,

    /// Coordination store connection
    #[serde(default)]
    pub store: store::StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl ShardcoordConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.coordinator.validate()?;
        self.process.validate()?;
        self.store.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = ShardcoordConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
