//! Configuration loading and environment variable handling

use crate::domains::ShardcoordConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "SHARDCOORD".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<ShardcoordConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml_str(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml_str(&self, content: &str) -> ConfigResult<ShardcoordConfig> {
        let mut config: ShardcoordConfig = serde_yaml::from_str(content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<ShardcoordConfig> {
        let mut config = ShardcoordConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<ShardcoordConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut ShardcoordConfig) -> ConfigResult<()> {
        self.apply_coordinator_overrides(&mut config.coordinator)?;
        self.apply_process_overrides(&mut config.process);
        self.apply_store_overrides(&mut config.store)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_coordinator_overrides(
        &self,
        config: &mut crate::domains::coordinator::CoordinatorConfig,
    ) -> ConfigResult<()> {
        if let Ok(total) = self.get_env_var("TOTAL_SHARDS") {
            config.total_shards = total
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid TOTAL_SHARDS: {}", e)))?;
        }

        if let Ok(crash_detection) = self.get_env_var("CRASH_DETECTION") {
            config.crash_detection = crash_detection
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid CRASH_DETECTION: {}", e)))?;
        }

        Ok(())
    }

    fn apply_process_overrides(&self, config: &mut crate::domains::process::ProcessConfig) {
        if let Ok(command) = self.get_env_var("SHARD_COMMAND") {
            config.command = command;
        }
    }

    fn apply_store_overrides(
        &self,
        config: &mut crate::domains::store::StoreConfig,
    ) -> ConfigResult<()> {
        if let Ok(backend) = self.get_env_var("STORE_BACKEND") {
            config.backend = crate::domains::store::StoreBackend::from_str(&backend)
                .map_err(ConfigError::EnvError)?;
        }

        if let Ok(url) = self.get_env_var("STORE_URL") {
            config.url = url;
        }

        if let Ok(prefix) = self.get_env_var("KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
