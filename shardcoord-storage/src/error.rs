//! Storage error types

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection-related errors
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    /// Command execution errors
    #[error("Store command failed: {0}")]
    CommandFailed(String),

    /// Indexed write past the end of a list
    #[error("Index {index} out of range for {key} (length {len})")]
    IndexOutOfRange { key: String, index: usize, len: usize },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] shardcoord_ipc::IpcError),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StorageError::ConnectionFailed(err.to_string())
        } else {
            StorageError::CommandFailed(err.to_string())
        }
    }
}
