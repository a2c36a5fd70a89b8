//! IPC error types

use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error on {channel}: {message}")]
    DeserializationError { channel: String, message: String },

    /// Payload was empty where a value is required
    #[error("Empty payload on {0}")]
    EmptyPayload(String),

    /// Shard id outside of the fleet
    #[error("Shard {shard_id} is outside 0..{total_shards}")]
    ShardOutOfRange { shard_id: u32, total_shards: u32 },
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::SerializationError(err.to_string())
    }
}
