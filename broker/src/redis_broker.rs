use crate::{ChannelBroker, Error, Payload, Result, Subscription};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::*;
use redis::aio::{ConnectionManager, ConnectionManagerConfig, PubSub};
use redis::AsyncCommands;
use std::pin::pin;
use std::time::Duration;

/// Connection settings for [`RedisBroker`].
#[derive(Clone, Debug)]
pub struct RedisSettings {
    pub url: String,
    /// Attempts made after the first failed connection before giving up.
    pub connect_retries: u32,
    /// Delay before the first retry; doubled after every failed attempt.
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub connection_timeout_secs: u64,
}

impl RedisSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_retries: 3,
            retry_delay_ms: 250,
            max_retry_delay_ms: 5_000,
            connection_timeout_secs: 5,
        }
    }
}

/// Redis pub/sub backed broker.
///
/// Publishing shares one auto-reconnecting `ConnectionManager`. Every subscription
/// gets its own dedicated pub/sub connection, since a Redis connection in
/// subscriber mode cannot issue regular commands.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisBroker {
    /// Connect to the Redis server described by `settings`.
    pub async fn connect(settings: &RedisSettings) -> Result<Self> {
        info!(
            "Connecting to Redis broker at {} (timeout={}s, retries={})",
            settings.url, settings.connection_timeout_secs, settings.connect_retries
        );

        let client = redis::Client::open(settings.url.as_str())?;
        let manager = Self::connect_with_retry(&client, settings).await?;

        info!("Connected to Redis broker");

        Ok(Self { client, manager })
    }

    /// Establish the publishing connection, backing off exponentially between attempts.
    async fn connect_with_retry(
        client: &redis::Client,
        settings: &RedisSettings,
    ) -> Result<ConnectionManager> {
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(settings.connection_timeout_secs))
            .set_number_of_retries(settings.connect_retries as usize);

        let mut delay_ms = settings.retry_delay_ms;
        let mut attempt = 0;

        loop {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await
            {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("Redis connection established after {attempt} retries");
                    }
                    return Ok(manager);
                }
                Err(e) if attempt < settings.connect_retries => {
                    attempt += 1;
                    warn!(
                        "Redis connection attempt {}/{} failed, retrying in {}ms: {}",
                        attempt,
                        settings.connect_retries + 1,
                        delay_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(settings.max_retry_delay_ms);
                }
                Err(e) => {
                    error!(
                        "Failed to connect to Redis after {} attempt(s): {e}",
                        attempt + 1
                    );
                    return Err(Error::connection(e));
                }
            }
        }
    }
}

#[async_trait]
impl ChannelBroker for RedisBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        debug!("Subscribed to Redis channel {channel}");

        Ok(Box::new(RedisSubscription {
            channel: channel.to_string(),
            pubsub: Some(pubsub),
        }))
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize> {
        let mut conn = self.manager.clone();
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

struct RedisSubscription {
    channel: String,
    /// `None` once unsubscribed.
    pubsub: Option<PubSub>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next(&mut self) -> Result<Option<Payload>> {
        let Some(pubsub) = self.pubsub.as_mut() else {
            return Ok(None);
        };

        let mut messages = pin!(pubsub.on_message());
        match messages.next().await {
            Some(msg) => Ok(Some(msg.get_payload_bytes().to_vec())),
            // Redis has no notion of closing a channel; the stream only ends
            // when the subscriber connection itself went away.
            None => Err(Error::connection(format!(
                "Redis pub/sub connection for channel {} closed",
                self.channel
            ))),
        }
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        let Some(mut pubsub) = self.pubsub.take() else {
            return Ok(());
        };

        // Dropping the connection detaches it server-side as well, so a failed
        // UNSUBSCRIBE on a dead connection is not worth surfacing.
        if let Err(e) = pubsub.unsubscribe(self.channel.as_str()).await {
            debug!(
                "UNSUBSCRIBE for channel {} failed, dropping connection: {e}",
                self.channel
            );
        }
        Ok(())
    }
}
