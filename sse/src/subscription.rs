use crate::envelope::Envelope;
use crate::error::Result;
use crate::session::StreamState;
use broker::{ChannelBroker, Subscription};
use log::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Relays one broker subscription into a sequence of `message` envelopes.
///
/// Lifecycle: `Open` once the subscription is acquired, `Streaming` while
/// relaying, then exactly one of the closed states. The subscription is released
/// before [`SubscriptionAdapter::run`] returns, whichever way it ends.
pub struct SubscriptionAdapter {
    subscription: Box<dyn Subscription>,
    cancel: CancellationToken,
    state: StreamState,
}

impl SubscriptionAdapter {
    /// Acquire a subscription to `channel`.
    ///
    /// A broker failure here means the stream never starts; nothing has been
    /// sent to the client yet, so the caller can still fail the request.
    pub async fn open(
        broker: &dyn ChannelBroker,
        channel: &str,
        cancel: CancellationToken,
    ) -> Result<Self> {
        match broker.subscribe(channel).await {
            Ok(subscription) => {
                debug!("Subscribed to channel {channel} via {} broker", broker.name());
                Ok(Self {
                    subscription,
                    cancel,
                    state: StreamState::Open,
                })
            }
            Err(e) => {
                error!(
                    "Failed to subscribe to channel {channel} via {} broker: {e}",
                    broker.name()
                );
                Err(e.into())
            }
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn channel(&self) -> &str {
        self.subscription.channel()
    }

    /// Relay payloads into `sink` until the channel closes, the broker fails or
    /// the session is cancelled. Returns the terminal state.
    pub async fn run(mut self, sink: mpsc::Sender<Envelope>) -> StreamState {
        self.transition(StreamState::Streaming);

        let outcome = self.relay(&sink).await;

        if let Err(e) = self.subscription.unsubscribe().await {
            warn!("Failed to unsubscribe from channel {}: {e}", self.channel());
        }

        self.transition(outcome);
        outcome
    }

    async fn relay(&mut self, sink: &mpsc::Sender<Envelope>) -> StreamState {
        loop {
            // Claim the hand-off slot before asking the broker for more, so a
            // slow client throttles the broker read.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamState::ClosedCancelled,
                permit = sink.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return StreamState::ClosedCancelled,
                },
            };

            // Cancellation is observed independently of the pending broker read,
            // so a quiet channel cannot keep a dead connection's subscription alive.
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamState::ClosedCancelled,
                next = self.subscription.next() => next,
            };

            let payload = match next {
                Ok(Some(payload)) => payload,
                Ok(None) => return StreamState::ClosedNormal,
                Err(e) => {
                    error!("Broker failure on channel {}: {e}", self.channel());
                    return StreamState::ClosedError;
                }
            };

            match Envelope::message(payload) {
                Ok(envelope) => {
                    trace!("Relaying message on channel {}", self.channel());
                    permit.send(envelope);
                }
                // Only this payload is lost; the stream carries on.
                Err(e) => warn!("Dropping payload on channel {}: {e}", self.channel()),
            }
        }
    }

    fn transition(&mut self, next: StreamState) {
        debug!(
            "Subscription adapter for channel {}: {:?} -> {:?}",
            self.channel(),
            self.state,
            next
        );
        self.state = next;
    }
}
