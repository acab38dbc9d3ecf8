use crate::error::Error;
use crate::{Broker, MessageStream};
use async_trait::async_trait;
use futures::StreamExt;
use log::*;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Startup connection retry settings.
#[derive(Debug, Clone)]
pub struct RedisConnectionConfig {
    pub initial_connection_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            initial_connection_retries: 5,
            initial_retry_delay_ms: 250,
            max_retry_delay_ms: 5_000,
        }
    }
}

/// Redis pub/sub broker.
///
/// Publishing goes through a shared `ConnectionManager`, which reconnects on
/// its own. Each subscription opens a dedicated pub/sub connection, because a
/// connection in subscriber mode cannot issue other commands.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisBroker {
    /// Connect to Redis, retrying with exponential backoff.
    pub async fn connect(url: &str, config: &RedisConnectionConfig) -> Result<Self, Error> {
        info!("Connecting to Redis broker at {url}");
        let client = redis::Client::open(url)?;
        let publisher = Self::connect_with_retry(&client, config).await?;
        info!("Connected to Redis broker");
        Ok(Self { client, publisher })
    }

    async fn connect_with_retry(
        client: &redis::Client,
        config: &RedisConnectionConfig,
    ) -> Result<ConnectionManager, Error> {
        let max_retries = config.initial_connection_retries;
        let mut delay_ms = config.initial_retry_delay_ms;

        let mut attempt = 0;
        loop {
            match ConnectionManager::new(client.clone()).await {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("Redis connection established after {attempt} retries");
                    }
                    return Ok(manager);
                }
                Err(e) if attempt < max_retries => {
                    warn!(
                        "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                        attempt + 1,
                        max_retries + 1,
                        delay_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    // Exponential backoff with cap
                    delay_ms = (delay_ms * 2).min(config.max_retry_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), Error> {
        let mut connection = self.publisher.clone();
        let receivers: i64 = connection.publish(channel, payload).await?;
        trace!("Published on {channel} to {receivers} subscriber connection(s)");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, Error> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!("Subscribed to Redis channel {channel}");

        let messages = pubsub.into_on_message().filter_map(|message| {
            let payload = message.get_payload::<String>();
            if let Err(e) = &payload {
                warn!("Dropping undecodable Redis message: {e}");
            }
            futures::future::ready(payload.ok())
        });

        Ok(Box::pin(messages))
    }
}
