use crate::connection::ConnectionRegistry;
use crate::envelope::validate_event_name;
use crate::error::Result;
use crate::polling::{PollingQueue, DEFAULT_RETRY_MS, DEFAULT_TICK};
use crate::session::{SessionStream, StreamSession, StreamSource};
use broker::ChannelBroker;
use log::*;
use std::sync::Arc;
use std::time::Duration;

/// Stream tuning shared by every session.
#[derive(Clone, Debug)]
pub struct Settings {
    pub poll_interval: Duration,
    pub poll_retry_ms: u64,
    /// `None` disables keep-alive comments.
    pub keep_alive: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_TICK,
            poll_retry_ms: DEFAULT_RETRY_MS,
            keep_alive: Some(Duration::from_secs(15)),
        }
    }
}

/// Process-scoped streaming context: the broker, the polling queue and the
/// registry of live connections. Every session is started from here.
pub struct Manager {
    broker: Arc<dyn ChannelBroker>,
    queue: PollingQueue,
    registry: Arc<ConnectionRegistry>,
    settings: Settings,
}

impl Manager {
    pub fn new(broker: Arc<dyn ChannelBroker>, settings: Settings) -> Self {
        Self {
            broker,
            queue: PollingQueue::new(),
            registry: Arc::new(ConnectionRegistry::new()),
            settings,
        }
    }

    pub fn broker(&self) -> &Arc<dyn ChannelBroker> {
        &self.broker
    }

    pub fn queue(&self) -> &PollingQueue {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start a stream for one HTTP connection.
    pub async fn open_stream(&self, source: StreamSource) -> Result<SessionStream> {
        StreamSession::new(source).start(self).await
    }

    /// Publish a text payload on a broker channel.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        match self.broker.publish(channel, payload.as_bytes()).await {
            Ok(receivers) => {
                debug!("Published to channel {channel}, {receivers} receiver(s)");
                Ok(receivers)
            }
            Err(e) => {
                error!("Failed to publish to channel {channel}: {e}");
                Err(e.into())
            }
        }
    }

    /// Append an event to the polling queue, returning the new queue length.
    ///
    /// Event names that cannot be framed are refused before they reach the
    /// queue.
    pub async fn enqueue(&self, event: &str, data: &str) -> Result<usize> {
        if let Err(e) = validate_event_name(event) {
            warn!("Refusing to queue event {event:?}: {e}");
            return Err(e);
        }
        let queued = self.queue.push(event, data).await;
        debug!("Queued {event} event, {queued} item(s) waiting");
        Ok(queued)
    }

    /// Cancel every live stream, e.g. on process shutdown.
    pub fn shutdown(&self) {
        info!(
            "Shutting down SSE manager with {} live connection(s)",
            self.registry.active_count()
        );
        self.registry.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::UnreachableBroker;
    use broker::MemoryBroker;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.poll_retry_ms, 15_000);
        assert_eq!(settings.keep_alive, Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn test_publish_reports_receivers() {
        let broker = Arc::new(MemoryBroker::new());
        let manager = Manager::new(broker.clone(), Settings::default());

        let _stream = manager
            .open_stream(StreamSource::Channel("default".to_string()))
            .await
            .unwrap();

        assert_eq!(manager.publish("default", "Hello world!").await.unwrap(), 1);
        assert_eq!(manager.publish("elsewhere", "nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_to_unreachable_broker_fails() {
        let manager = Manager::new(Arc::new(UnreachableBroker), Settings::default());
        let err = manager.publish("default", "Hello world!").await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::BrokerConnection);
    }

    #[tokio::test]
    async fn test_enqueue_grows_shared_queue() {
        let manager = Manager::new(Arc::new(MemoryBroker::new()), Settings::default());
        assert_eq!(manager.enqueue("message", "one").await.unwrap(), 1);
        assert_eq!(manager.enqueue("status", "two").await.unwrap(), 2);
        assert_eq!(manager.queue().len().await, 2);
    }

    #[tokio::test]
    async fn test_enqueue_refuses_multiline_event_name() {
        let manager = Manager::new(Arc::new(MemoryBroker::new()), Settings::default());

        let err = manager
            .enqueue("message\ndata: INJECTED\n\nevent: admin", "x")
            .await
            .unwrap_err();

        assert!(matches!(err.error_kind, ErrorKind::InvalidEventName(_)));
        assert!(manager.queue().is_empty().await);
    }
}
