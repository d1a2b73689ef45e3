use crate::{ChannelBroker, Payload, Result, Subscription};
use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Messages a slow subscriber may fall behind before it starts skipping.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// In-process pub/sub broker built on tokio broadcast channels.
///
/// One broadcast sender per channel name, created lazily by the first subscriber
/// and dropped again when the last one leaves. Publishing to a channel nobody
/// listens on is a no-op, which gives the same "no backlog" behaviour as Redis
/// pub/sub.
pub struct MemoryBroker {
    channels: Arc<DashMap<String, broadcast::Sender<Payload>>>,
    capacity: usize,
    subscribe_calls: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Number of live subscriptions attached to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of channels that currently have a sender.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total number of `subscribe` calls made against this broker.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Close `channel` from the broker side. Current subscribers drain what was
    /// already delivered to them and then see end of stream.
    pub fn close_channel(&self, channel: &str) {
        if self.channels.remove(channel).is_some() {
            debug!("Closed in-memory channel {channel}");
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelBroker for MemoryBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let receiver = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        trace!("Attached in-memory subscriber to channel {channel}");

        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            channels: Arc::clone(&self.channels),
            receiver: Some(receiver),
        }))
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize> {
        let Some(sender) = self.channels.get(channel).map(|s| s.value().clone()) else {
            return Ok(0);
        };

        // A send error only means nobody is listening right now.
        Ok(sender.send(payload.to_vec()).unwrap_or(0))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemorySubscription {
    channel: String,
    channels: Arc<DashMap<String, broadcast::Sender<Payload>>>,
    receiver: Option<broadcast::Receiver<Payload>>,
}

impl MemorySubscription {
    /// Drop the receiver, and the channel's sender with it if nobody else is
    /// attached. The count is checked under the map's shard lock, so a
    /// concurrent subscribe either keeps the sender or creates a fresh one.
    fn detach(&mut self) -> bool {
        if self.receiver.take().is_none() {
            return false;
        }

        if self
            .channels
            .remove_if(&self.channel, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            trace!("Dropped idle in-memory channel {}", self.channel);
        }
        true
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next(&mut self) -> Result<Option<Payload>> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(None);
        };

        loop {
            match receiver.recv().await {
                Ok(payload) => return Ok(Some(payload)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Subscriber on channel {} fell behind, {} message(s) dropped",
                        self.channel, skipped
                    );
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if self.detach() {
            trace!("Detached in-memory subscriber from channel {}", self.channel);
        }
        Ok(())
    }
}
