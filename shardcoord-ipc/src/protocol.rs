//! Protocol definitions and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard identity, stable for the lifetime of the fleet
pub type ShardId = u32;

/// Connection state reported by a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Any transitional state this coordinator does not know about
    #[serde(other)]
    Unknown,
}

impl ConnectionState {
    /// Whether a report in this state counts as a strike against the shard
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Disconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Status record of one shard, stored at list index `shard_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardState {
    pub shard_id: ShardId,
    pub connection_state: ConnectionState,
    #[serde(default)]
    pub guild_count: u64,
    pub last_report_time: DateTime<Utc>,
}

impl ShardState {
    /// Record written for a shard that is down or not started yet
    pub fn placeholder(shard_id: ShardId, last_report_time: DateTime<Utc>) -> Self {
        Self {
            shard_id,
            connection_state: ConnectionState::Disconnected,
            guild_count: 0,
            last_report_time,
        }
    }

    /// Whether the last report is older than `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_report_time < cutoff
    }
}

/// Inbound control signals
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Periodic status report from a shard
    Heartbeat(ShardState),
    /// Stop the shard and start it again immediately
    Restart { shard_id: ShardId },
    /// Stop the shard without scheduling a restart
    Stop { shard_id: ShardId },
    /// Terminate the coordinator
    Shutdown,
}

impl ControlMessage {
    /// Shard the message is about, if any
    pub fn shard_id(&self) -> Option<ShardId> {
        match self {
            ControlMessage::Heartbeat(state) => Some(state.shard_id),
            ControlMessage::Restart { shard_id } | ControlMessage::Stop { shard_id } => {
                Some(*shard_id)
            }
            ControlMessage::Shutdown => None,
        }
    }
}
