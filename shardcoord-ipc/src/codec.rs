//! Translation between control messages and raw pub/sub payloads

use crate::channels::ChannelNames;
use crate::error::IpcError;
use crate::protocol::{ControlMessage, ShardId, ShardState};

/// Decode a payload received on `channel`
///
/// Returns `Ok(None)` for channels that carry no control message. Shard ids
/// are checked against `total_shards` so callers can index per-shard tables.
pub fn decode(
    names: &ChannelNames,
    total_shards: u32,
    channel: &str,
    payload: &str,
) -> Result<Option<ControlMessage>, IpcError> {
    let message = if channel == names.heartbeat {
        let state: ShardState = parse(channel, payload)?;
        ControlMessage::Heartbeat(state)
    } else if channel == names.restart {
        ControlMessage::Restart {
            shard_id: parse(channel, payload)?,
        }
    } else if channel == names.stop {
        ControlMessage::Stop {
            shard_id: parse(channel, payload)?,
        }
    } else if channel == names.die {
        ControlMessage::Shutdown
    } else {
        log::trace!("Ignoring message on unrelated channel {}", channel);
        return Ok(None);
    };

    if let Some(shard_id) = message.shard_id() {
        check_range(shard_id, total_shards)?;
    }

    Ok(Some(message))
}

/// Encode a control message into `(channel, payload)`
pub fn encode(names: &ChannelNames, message: &ControlMessage) -> Result<(String, String), IpcError> {
    let encoded = match message {
        ControlMessage::Heartbeat(state) => (names.heartbeat.clone(), serde_json::to_string(state)?),
        ControlMessage::Restart { shard_id } => (names.restart.clone(), shard_id.to_string()),
        ControlMessage::Stop { shard_id } => (names.stop.clone(), shard_id.to_string()),
        ControlMessage::Shutdown => (names.die.clone(), String::new()),
    };
    Ok(encoded)
}

fn parse<T: serde::de::DeserializeOwned>(channel: &str, payload: &str) -> Result<T, IpcError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "null" {
        return Err(IpcError::EmptyPayload(channel.to_string()));
    }
    serde_json::from_str(payload).map_err(|e| IpcError::DeserializationError {
        channel: channel.to_string(),
        message: e.to_string(),
    })
}

fn check_range(shard_id: ShardId, total_shards: u32) -> Result<(), IpcError> {
    if shard_id >= total_shards {
        return Err(IpcError::ShardOutOfRange {
            shard_id,
            total_shards,
        });
    }
    Ok(())
}
