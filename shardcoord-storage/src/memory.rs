//! Process-local coordination store

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{StorageError, StorageResult};
use crate::store::{ChannelMessage, CoordinationStore, Subscription};

const BUS_CAPACITY: usize = 1024;

/// In-memory store with the same list and pub/sub semantics as Redis
pub struct InMemoryStore {
    lists: RwLock<HashMap<String, Vec<String>>>,
    bus: broadcast::Sender<ChannelMessage>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            lists: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.bus.receiver_count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.lists.write().remove(key);
        Ok(())
    }

    async fn push(&self, key: &str, value: String) -> StorageResult<()> {
        self.lists
            .write()
            .entry(key.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn read_all(&self, key: &str) -> StorageResult<Vec<String>> {
        Ok(self.lists.read().get(key).cloned().unwrap_or_default())
    }

    async fn write_at(&self, key: &str, index: usize, value: String) -> StorageResult<()> {
        let mut lists = self.lists.write();
        let list = lists.get_mut(key).ok_or_else(|| StorageError::IndexOutOfRange {
            key: key.to_string(),
            index,
            len: 0,
        })?;

        let len = list.len();
        let slot = list.get_mut(index).ok_or_else(|| StorageError::IndexOutOfRange {
            key: key.to_string(),
            index,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> StorageResult<()> {
        // No receivers is not an error: delivery is at-most-once
        let _ = self.bus.send(ChannelMessage {
            channel: channel.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> StorageResult<Subscription> {
        let wanted: HashSet<String> = channels.iter().cloned().collect();
        let stream = BroadcastStream::new(self.bus.subscribe()).filter_map(move |received| {
            let message = match received {
                Ok(message) if wanted.contains(&message.channel) => Some(message),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("In-memory subscriber lagged, {} messages dropped", skipped);
                    None
                }
            };
            futures::future::ready(message)
        });
        Ok(stream.boxed())
    }
}
