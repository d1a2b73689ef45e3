//! Per-connection stream sessions.
//!
//! A [`StreamSession`] picks the adapter for its [`StreamSource`], runs it on its
//! own task and hands the HTTP layer a [`SessionStream`] of envelopes. The
//! stream owns a drop guard on the session's cancellation token: when the HTTP
//! layer drops the response body because the peer went away, the adapter is
//! told to stop even if it is parked on a quiet broker channel.

use crate::connection::{ConnectionId, Registration};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::polling::PollingAdapter;
use crate::subscription::SubscriptionAdapter;
use futures::Stream;
use log::*;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Media type a client must accept to be handed a stream.
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Check an `Accept` header value for the SSE media type.
///
/// A missing header counts as not accepting it.
pub fn negotiate(accept: Option<&str>) -> Result<()> {
    match accept {
        Some(accept) if accept.contains(EVENT_STREAM_MIME) => Ok(()),
        _ => Err(Error::negotiation()),
    }
}

/// Lifecycle of a stream adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Streaming,
    /// The broker closed the channel.
    ClosedNormal,
    /// The broker connection failed mid-stream.
    ClosedError,
    /// The peer disconnected or the process is shutting down.
    ClosedCancelled,
}

impl StreamState {
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            StreamState::ClosedNormal | StreamState::ClosedError | StreamState::ClosedCancelled
        )
    }
}

/// Where a session's envelopes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    Channel(String),
    PollingQueue,
}

impl std::fmt::Display for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamSource::Channel(channel) => write!(f, "channel {channel}"),
            StreamSource::PollingQueue => write!(f, "polling queue"),
        }
    }
}

enum Adapter {
    Subscription(SubscriptionAdapter),
    Polling(PollingAdapter),
}

impl Adapter {
    async fn run(self, sink: mpsc::Sender<Envelope>) -> StreamState {
        match self {
            Adapter::Subscription(adapter) => adapter.run(sink).await,
            Adapter::Polling(adapter) => adapter.run(sink).await,
        }
    }
}

/// Coordinates one HTTP connection's stream.
pub struct StreamSession {
    source: StreamSource,
    cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(source: StreamSource) -> Self {
        Self {
            source,
            cancel: CancellationToken::new(),
        }
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    /// Acquire the adapter's resources and start streaming.
    ///
    /// Fails only before anything has been streamed (the broker subscription
    /// could not be acquired), so callers can still answer with an error status.
    pub async fn start(self, manager: &Manager) -> Result<SessionStream> {
        let settings = manager.settings();

        let adapter = match &self.source {
            StreamSource::Channel(channel) => Adapter::Subscription(
                SubscriptionAdapter::open(manager.broker().as_ref(), channel, self.cancel.clone())
                    .await?,
            ),
            StreamSource::PollingQueue => Adapter::Polling(
                PollingAdapter::new(manager.queue().clone(), self.cancel.clone())
                    .with_tick(settings.poll_interval)
                    .with_retry_ms(settings.poll_retry_ms),
            ),
        };

        let registration = Registration::new(
            manager.registry().clone(),
            self.source.clone(),
            self.cancel.clone(),
        );
        let connection_id = registration.connection_id().clone();
        info!("Opened SSE connection {connection_id} on {}", self.source);

        // Capacity one: the adapter reserves the slot before reading from its
        // source, so it never gets more than one envelope ahead of the body.
        let (sender, receiver) = mpsc::channel(1);

        let source = self.source;
        let task = tokio::spawn(async move {
            let state = adapter.run(sender).await;
            let task_id = registration.connection_id().clone();
            drop(registration);

            match state {
                StreamState::ClosedError => {
                    warn!("SSE connection {task_id} on {source} closed after a broker failure")
                }
                StreamState::ClosedCancelled => {
                    info!("SSE connection {task_id} on {source} closed by peer")
                }
                _ => info!("SSE connection {task_id} on {source} closed ({state:?})"),
            }
            state
        });

        Ok(SessionStream {
            connection_id,
            receiver,
            task: Some(task),
            _disconnect: self.cancel.drop_guard(),
        })
    }
}

/// Envelopes produced for one connection.
///
/// Dropping the stream cancels the session.
pub struct SessionStream {
    connection_id: ConnectionId,
    receiver: mpsc::Receiver<Envelope>,
    task: Option<JoinHandle<StreamState>>,
    _disconnect: DropGuard,
}

impl SessionStream {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Take the handle of the adapter task, which resolves to its terminal state.
    pub fn take_task(&mut self) -> Option<JoinHandle<StreamState>> {
        self.task.take()
    }
}

impl Stream for SessionStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::manager::Settings;
    use crate::testing::UnreachableBroker;
    use broker::{ChannelBroker, MemoryBroker};
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn memory_manager() -> (Arc<MemoryBroker>, Manager) {
        let broker = Arc::new(MemoryBroker::new());
        let manager = Manager::new(broker.clone(), Settings::default());
        (broker, manager)
    }

    #[test]
    fn test_negotiate_requires_event_stream() {
        assert!(negotiate(Some("text/event-stream")).is_ok());
        assert!(negotiate(Some("text/html, text/event-stream;q=0.9")).is_ok());

        let err = negotiate(Some("text/html")).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Negotiation);
        assert!(negotiate(None).is_err());
    }

    #[test]
    fn test_closed_states() {
        assert!(!StreamState::Open.is_closed());
        assert!(!StreamState::Streaming.is_closed());
        assert!(StreamState::ClosedNormal.is_closed());
        assert!(StreamState::ClosedError.is_closed());
        assert!(StreamState::ClosedCancelled.is_closed());
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_message_and_stays_open() {
        let (broker, manager) = memory_manager();
        let mut stream = StreamSession::new(StreamSource::Channel("default".to_string()))
            .start(&manager)
            .await
            .unwrap();

        assert_eq!(broker.publish("default", b"Hello world!").await.unwrap(), 1);

        let envelope = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope, Envelope::new("message", "Hello world!"));

        // Nothing else was published, so the stream keeps waiting.
        assert!(timeout(Duration::from_millis(100), stream.next())
            .await
            .is_err());
        assert_eq!(manager.registry().channel_count("default"), 1);
    }

    #[tokio::test]
    async fn test_messages_published_before_attach_are_not_replayed() {
        let (broker, manager) = memory_manager();

        // Another subscriber keeps the channel alive while we publish.
        let mut early = broker.subscribe("default").await.unwrap();
        for payload in ["one", "two", "three"] {
            broker.publish("default", payload.as_bytes()).await.unwrap();
        }

        let mut stream = StreamSession::new(StreamSource::Channel("default".to_string()))
            .start(&manager)
            .await
            .unwrap();
        broker.publish("default", b"fresh").await.unwrap();

        let envelope = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.data(), "fresh");

        early.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_subscription() {
        let (broker, manager) = memory_manager();
        let mut stream = StreamSession::new(StreamSource::Channel("quiet".to_string()))
            .start(&manager)
            .await
            .unwrap();
        let task = stream.take_task().unwrap();
        assert_eq!(broker.subscriber_count("quiet"), 1);

        // The peer going away drops the response body.
        drop(stream);

        let state = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(state, StreamState::ClosedCancelled);
        assert_eq!(broker.subscriber_count("quiet"), 0);
        assert_eq!(manager.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_start_without_registering() {
        let manager = Manager::new(Arc::new(UnreachableBroker), Settings::default());

        let result = StreamSession::new(StreamSource::Channel("default".to_string()))
            .start(&manager)
            .await;

        match result {
            Err(e) => assert_eq!(e.error_kind, ErrorKind::BrokerConnection),
            Ok(_) => panic!("stream must not start without a subscription"),
        }
        assert_eq!(manager.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_broker_close_ends_stream_after_pending_envelope() {
        let (broker, manager) = memory_manager();
        let mut stream = StreamSession::new(StreamSource::Channel("default".to_string()))
            .start(&manager)
            .await
            .unwrap();
        let task = stream.take_task().unwrap();

        broker.publish("default", b"line one\nline two").await.unwrap();
        broker.close_channel("default");

        let first = stream.next().await.unwrap();
        assert_eq!(first.encode(), "event: message\ndata: line one\ndata: line two\n\n");
        assert!(stream.next().await.is_none());
        assert_eq!(task.await.unwrap(), StreamState::ClosedNormal);
        assert_eq!(manager.registry().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_session_streams_queue_lifo() {
        let (broker, manager) = memory_manager();
        for data in ["a", "b", "c"] {
            manager.queue().push("message", data).await;
        }

        let mut stream = StreamSession::new(StreamSource::PollingQueue)
            .start(&manager)
            .await
            .unwrap();
        let task = stream.take_task().unwrap();

        let mut ids = Vec::new();
        for expected in ["c", "b", "a"] {
            let envelope = stream.next().await.unwrap();
            assert_eq!(envelope.data(), expected);
            assert_eq!(envelope.retry(), Some(15_000));
            ids.push(envelope.id().unwrap());
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        // A polling session never touches the broker.
        assert_eq!(broker.subscribe_calls(), 0);

        drop(stream);
        assert_eq!(task.await.unwrap(), StreamState::ClosedCancelled);
        assert_eq!(manager.registry().polling_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_live_sessions() {
        let (broker, manager) = memory_manager();
        let mut stream = StreamSession::new(StreamSource::Channel("default".to_string()))
            .start(&manager)
            .await
            .unwrap();
        let task = stream.take_task().unwrap();

        manager.shutdown();

        assert_eq!(task.await.unwrap(), StreamState::ClosedCancelled);
        assert!(stream.next().await.is_none());
        assert_eq!(broker.subscriber_count("default"), 0);
    }
}
