//! Deduplicating start queue

use parking_lot::Mutex;
use shardcoord_ipc::ShardId;
use std::collections::{HashSet, VecDeque};

/// FIFO of shards waiting for a (re)start; a pending shard is queued once
#[derive(Debug, Default)]
pub struct StartQueue {
    inner: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    order: VecDeque<ShardId>,
    pending: HashSet<ShardId>,
}

impl StartQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `shard_id` unless it is already pending; returns whether it was added
    pub fn enqueue(&self, shard_id: ShardId) -> bool {
        let mut state = self.inner.lock();
        if state.pending.insert(shard_id) {
            state.order.push_back(shard_id);
            true
        } else {
            false
        }
    }

    /// Pop the oldest pending shard
    pub fn try_dequeue(&self) -> Option<ShardId> {
        let mut state = self.inner.lock();
        let shard_id = state.order.pop_front()?;
        state.pending.remove(&shard_id);
        Some(shard_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, shard_id: ShardId) -> bool {
        self.inner.lock().pending.contains(&shard_id)
    }
}
