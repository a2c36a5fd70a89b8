//! Store interface definitions

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StorageResult;

/// One message received on a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// Stream of messages for the channels passed to [`CoordinationStore::subscribe`]
pub type Subscription = BoxStream<'static, ChannelMessage>;

/// Shared state holder: keyed lists plus publish/subscribe
///
/// Every operation is atomic per key. Publishing is fire-and-forget: a message
/// published while nobody is subscribed is lost.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Remove a key entirely
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Append to the list at `key`, creating it if needed
    async fn push(&self, key: &str, value: String) -> StorageResult<()>;

    /// Read every element of the list at `key`; a missing key reads as empty
    async fn read_all(&self, key: &str) -> StorageResult<Vec<String>>;

    /// Overwrite the element at `index`; fails if the list is shorter
    async fn write_at(&self, key: &str, index: usize, value: String) -> StorageResult<()>;

    /// Publish a payload on a channel
    async fn publish(&self, channel: &str, payload: String) -> StorageResult<()>;

    /// Subscribe to a set of channels
    async fn subscribe(&self, channels: &[String]) -> StorageResult<Subscription>;
}
