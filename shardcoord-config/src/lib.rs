//! Domain-driven configuration management for the shard coordinator
//!
//! Configuration is split by functional domain (coordinator timing, worker
//! process template, coordination store, logging), each with serde defaults,
//! validation and `SHARDCOORD_*` environment overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    coordinator::{BackoffSettings, CoordinatorConfig},
    logging::{LogFormat, LogLevel, LogTarget, LoggingConfig},
    process::ProcessConfig,
    store::{StoreBackend, StoreConfig},
    ShardcoordConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
