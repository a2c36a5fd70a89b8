//! `shardcoord restart|stop|die`: publish control messages to a running coordinator

use anyhow::{bail, Context, Result};
use tracing::info;

use shardcoord_config::ShardcoordConfig;
use shardcoord_ipc::{ChannelNames, ControlMessage};
use shardcoord_storage::ControlPublisher;

pub async fn send_command(config: &ShardcoordConfig, message: ControlMessage) -> Result<()> {
    if let Some(shard_id) = message.shard_id() {
        let total_shards = config.coordinator.total_shards;
        if shard_id >= total_shards {
            bail!("Shard {} does not exist (total_shards = {})", shard_id, total_shards);
        }
    }

    let store = shardcoord_storage::connect(&config.store)
        .await
        .context("Failed to connect to the coordination store")?;
    let publisher = ControlPublisher::new(store, ChannelNames::new(&config.store.key_prefix));

    publisher
        .send(&message)
        .await
        .context("Failed to publish control message")?;
    info!("Sent {:?}", message);
    println!("Sent {}", describe(&message));
    Ok(())
}

fn describe(message: &ControlMessage) -> String {
    match message {
        ControlMessage::Restart { shard_id } => format!("restart request for shard {}", shard_id),
        ControlMessage::Stop { shard_id } => format!("stop request for shard {}", shard_id),
        ControlMessage::Shutdown => "shutdown request".to_string(),
        ControlMessage::Heartbeat(state) => format!("report for shard {}", state.shard_id),
    }
}
