//! Probation list for shards with one unhealthy report

use parking_lot::Mutex;
use shardcoord_ipc::ShardId;
use std::collections::HashSet;

/// Shards that reported unhealthy once and have not recovered yet
#[derive(Debug, Default)]
pub struct WaitingList {
    members: Mutex<HashSet<ShardId>>,
}

impl WaitingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically add `shard_id`; `false` means it was already on probation
    pub fn add_if_absent(&self, shard_id: ShardId) -> bool {
        self.members.lock().insert(shard_id)
    }

    /// Remove `shard_id` if present; returns whether it was present
    pub fn remove(&self, shard_id: ShardId) -> bool {
        self.members.lock().remove(&shard_id)
    }

    pub fn contains(&self, shard_id: ShardId) -> bool {
        self.members.lock().contains(&shard_id)
    }
}
