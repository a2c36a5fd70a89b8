//! Typed access to the shard status list and the control channels

use std::sync::Arc;

use shardcoord_ipc::{codec, ChannelNames, ControlMessage, ShardState};

use crate::error::StorageResult;
use crate::store::CoordinationStore;

/// Repository over the `<prefix>_shardstats` list
#[derive(Clone)]
pub struct ShardStatsRepository {
    store: Arc<dyn CoordinationStore>,
    key: String,
}

impl ShardStatsRepository {
    pub fn new(store: Arc<dyn CoordinationStore>, names: &ChannelNames) -> Self {
        Self {
            store,
            key: names.shard_stats.clone(),
        }
    }

    /// Replace the whole list with one record per shard, in shard order
    pub async fn reset(&self, states: &[ShardState]) -> StorageResult<()> {
        self.store.delete(&self.key).await?;
        for state in states {
            self.store
                .push(&self.key, serde_json::to_string(state)?)
                .await?;
        }
        Ok(())
    }

    /// Overwrite the record at `state.shard_id`
    pub async fn write(&self, state: &ShardState) -> StorageResult<()> {
        let index = ChannelNames::stats_index(state.shard_id);
        self.store
            .write_at(&self.key, index, serde_json::to_string(state)?)
            .await
    }

    /// Snapshot of every record that decodes
    ///
    /// Undecodable entries are skipped so one corrupt record cannot blind
    /// the staleness sweep to the rest of the fleet.
    pub async fn read_all(&self) -> StorageResult<Vec<ShardState>> {
        let raw = self.store.read_all(&self.key).await?;
        let states = raw
            .iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_str::<ShardState>(value) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!("Skipping undecodable shard record at index {}: {}", index, e);
                    None
                }
            })
            .collect();
        Ok(states)
    }
}

/// Publishes control messages, as other services and the CLI do
#[derive(Clone)]
pub struct ControlPublisher {
    store: Arc<dyn CoordinationStore>,
    names: ChannelNames,
}

impl ControlPublisher {
    pub fn new(store: Arc<dyn CoordinationStore>, names: ChannelNames) -> Self {
        Self { store, names }
    }

    pub async fn send(&self, message: &ControlMessage) -> StorageResult<()> {
        let (channel, payload) = codec::encode(&self.names, message)?;
        self.store.publish(&channel, payload).await
    }
}
