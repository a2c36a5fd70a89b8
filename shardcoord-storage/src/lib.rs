//! Coordination store abstraction for the shard coordinator
//!
//! The store holds the per-shard status list and carries the control
//! channels. [`CoordinationStore`] is the seam; [`InMemoryStore`] backs tests
//! and single-host runs, [`RedisStore`] is the shared production backend.
//! [`ShardStatsRepository`] and [`ControlPublisher`] layer the typed protocol
//! on top of the raw string operations.

pub mod error;
pub mod memory;
pub mod repositories;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use repositories::{ControlPublisher, ShardStatsRepository};
pub use store::{ChannelMessage, CoordinationStore, Subscription};

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use shardcoord_config::{StoreBackend, StoreConfig};
use std::sync::Arc;

/// Open the store selected by configuration
pub async fn connect(config: &StoreConfig) -> StorageResult<Arc<dyn CoordinationStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory coordination store; workers cannot reach it");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(&config.url).await?)),
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => Err(StorageError::ConfigError(
            "Redis backend not available. Build with --features=redis".to_string(),
        )),
    }
}
