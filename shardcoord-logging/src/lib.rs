//! Structured logging setup for the shard coordinator
//!
//! Installs a global `tracing` subscriber from [`LoggingConfig`]. Crates that
//! log through the `log` facade are captured by the subscriber's log bridge.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing, LoggingGuard};
pub use shardcoord_config::{LogFormat, LogLevel, LogTarget, LoggingConfig};
