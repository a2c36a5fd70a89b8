//! Error types for the coordinator

use shardcoord_ipc::ShardId;
use thiserror::Error;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, ExecutionError>;

/// Coordinator errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to launch shard {shard_id}: {source}")]
    LaunchFailed {
        shard_id: ShardId,
        #[source]
        source: std::io::Error,
    },

    #[error("Shard {shard_id} is outside 0..{total_shards}")]
    ShardOutOfRange { shard_id: ShardId, total_shards: u32 },

    #[error("Coordinator is shutting down")]
    ShuttingDown,

    #[error("Store error: {0}")]
    StoreError(#[from] shardcoord_storage::StorageError),

    #[error("Protocol error: {0}")]
    IpcError(#[from] shardcoord_ipc::IpcError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}
