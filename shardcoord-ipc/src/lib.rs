//! Wire protocol for the shard coordinator
//!
//! This crate defines the shard status record workers publish, the names of
//! the store keys and pub/sub channels under a namespace prefix, and the codec
//! that turns a raw `(channel, payload)` pair into a [`ControlMessage`].

pub mod channels;
pub mod codec;
pub mod error;
pub mod protocol;

// Re-export commonly used types
pub use channels::ChannelNames;
pub use codec::{decode, encode};
pub use error::IpcError;
pub use protocol::{ConnectionState, ControlMessage, ShardId, ShardState};
