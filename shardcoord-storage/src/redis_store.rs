//! Redis-backed coordination store

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::error::StorageResult;
use crate::store::{ChannelMessage, CoordinationStore, Subscription};

/// Coordination store on a shared Redis instance
///
/// Commands go through one multiplexed connection; every subscription opens
/// its own pub/sub connection.
pub struct RedisStore {
    client: redis::Client,
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        tracing::info!("Connected to coordination store at {}", url);
        Ok(Self { client, connection })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _: () = self.conn().del(key).await?;
        Ok(())
    }

    async fn push(&self, key: &str, value: String) -> StorageResult<()> {
        let _: () = self.conn().rpush(key, value).await?;
        Ok(())
    }

    async fn read_all(&self, key: &str) -> StorageResult<Vec<String>> {
        let values: Vec<String> = self.conn().lrange(key, 0, -1).await?;
        Ok(values)
    }

    async fn write_at(&self, key: &str, index: usize, value: String) -> StorageResult<()> {
        let _: () = self.conn().lset(key, index as isize, value).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> StorageResult<()> {
        let _: () = self.conn().publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> StorageResult<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel.as_str()).await?;
        }

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let message = match msg.get_payload::<String>() {
                Ok(payload) => Some(ChannelMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                }),
                Err(e) => {
                    tracing::debug!(
                        "Dropping undecodable payload on {}: {}",
                        msg.get_channel_name(),
                        e
                    );
                    None
                }
            };
            futures::future::ready(message)
        });

        Ok(stream.boxed())
    }
}
