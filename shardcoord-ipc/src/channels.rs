//! Store key and channel names under a namespace prefix

use crate::protocol::ShardId;

/// Names of the shared list and the control channels for one fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    pub shard_stats: String,
    pub heartbeat: String,
    pub restart: String,
    pub stop: String,
    pub die: String,
}

impl ChannelNames {
    pub fn new(prefix: &str) -> Self {
        Self {
            shard_stats: format!("{}_shardstats", prefix),
            heartbeat: format!("{}_shardcoord_send", prefix),
            restart: format!("{}_shardcoord_restart", prefix),
            stop: format!("{}_shardcoord_stop", prefix),
            die: format!("{}_die", prefix),
        }
    }

    /// Every channel the coordinator subscribes to
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            self.heartbeat.clone(),
            self.restart.clone(),
            self.stop.clone(),
            self.die.clone(),
        ]
    }

    /// Index of a shard's record inside `shard_stats`
    pub fn stats_index(shard_id: ShardId) -> usize {
        shard_id as usize
    }
}
