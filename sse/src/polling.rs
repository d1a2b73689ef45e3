//! In-memory polling queue and the adapter that drains it.
//!
//! The queue is shared by every polling connection in the process. Each queued
//! item reaches at most one connection, and items are taken newest first: under
//! continuous production older items may never be delivered. Sequence ids come
//! from one process-wide counter, so a single stream sees gaps whenever other
//! connections are draining the queue too.

use crate::envelope::Envelope;
use crate::session::StreamState;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Retry hint attached to every polled envelope unless configured otherwise.
pub const DEFAULT_RETRY_MS: u64 = 15_000;
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub event: String,
    pub data: String,
}

#[derive(Default)]
struct QueueState {
    items: Vec<QueuedEvent>,
    next_id: u64,
}

/// Process-wide queue of `(event, data)` pairs.
///
/// Cloning hands out another handle to the same queue. Push and pop take the
/// same lock, so concurrent producers and consumers never lose or duplicate
/// an item.
#[derive(Clone, Default)]
pub struct PollingQueue {
    state: Arc<Mutex<QueueState>>,
}

impl PollingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and return the resulting queue length.
    pub async fn push(&self, event: impl Into<String>, data: impl Into<String>) -> usize {
        let mut state = self.state.lock().await;
        state.items.push(QueuedEvent {
            event: event.into(),
            data: data.into(),
        });
        state.items.len()
    }

    /// Remove the most recently appended item and assign it the next sequence id.
    pub async fn pop_latest(&self) -> Option<(u64, QueuedEvent)> {
        let mut state = self.state.lock().await;
        let item = state.items.pop()?;
        let id = state.next_id;
        state.next_id += 1;
        Some((id, item))
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.items.is_empty()
    }
}

/// Drains the shared [`PollingQueue`] on a fixed tick.
///
/// Each tick checks for cancellation first, then takes at most one item. The
/// adapter has no failure mode of its own; it runs until its connection is
/// cancelled.
pub struct PollingAdapter {
    queue: PollingQueue,
    cancel: CancellationToken,
    tick: Duration,
    retry_ms: u64,
    state: StreamState,
}

impl PollingAdapter {
    pub fn new(queue: PollingQueue, cancel: CancellationToken) -> Self {
        Self {
            queue,
            cancel,
            tick: DEFAULT_TICK,
            retry_ms: DEFAULT_RETRY_MS,
            state: StreamState::Open,
        }
    }

    /// A zero tick is ignored and the current one kept.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        if tick.is_zero() {
            warn!("Ignoring zero poll interval, keeping {:?}", self.tick);
        } else {
            self.tick = tick;
        }
        self
    }

    pub fn with_retry_ms(mut self, retry_ms: u64) -> Self {
        self.retry_ms = retry_ms;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub async fn run(mut self, sink: mpsc::Sender<Envelope>) -> StreamState {
        self.state = StreamState::Streaming;
        debug!("Polling adapter streaming every {:?}", self.tick);

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Waiting for the tick still wakes up as soon as the connection is cancelled.
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Claim the hand-off slot first so nothing is popped that the
            // connection can no longer take.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = sink.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some((id, item)) = self.queue.pop_latest().await else {
                continue;
            };

            trace!("Polled event {} with sequence id {id}", item.event);

            permit.send(
                Envelope::new(item.event, item.data)
                    .with_id(id)
                    .with_retry(self.retry_ms),
            );
        }

        self.state = StreamState::ClosedCancelled;
        debug!("Polling adapter stopped");
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_pop_latest_is_lifo_with_increasing_ids() {
        let queue = PollingQueue::new();
        queue.push("message", "a").await;
        queue.push("message", "b").await;
        assert_eq!(queue.push("message", "c").await, 3);

        let popped: Vec<(u64, String)> = vec![
            queue.pop_latest().await.unwrap(),
            queue.pop_latest().await.unwrap(),
            queue.pop_latest().await.unwrap(),
        ]
        .into_iter()
        .map(|(id, item)| (id, item.data))
        .collect();

        assert_eq!(
            popped,
            vec![(0, "c".to_string()), (1, "b".to_string()), (2, "a".to_string())]
        );
        assert!(queue.pop_latest().await.is_none());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_sequence_counter_is_shared_across_handles() {
        let queue = PollingQueue::new();
        let other = queue.clone();

        queue.push("message", "x").await;
        other.push("message", "y").await;

        assert_eq!(other.pop_latest().await.unwrap().0, 0);
        assert_eq!(queue.pop_latest().await.unwrap().0, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_ticks_deliver_newest_first() {
        let queue = PollingQueue::new();
        for data in ["a", "b", "c"] {
            queue.push("update", data).await;
        }

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let adapter = PollingAdapter::new(queue.clone(), cancel.clone());
        let task = tokio::spawn(adapter.run(tx));

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap());
        }

        let data: Vec<&str> = received.iter().map(|e| e.data()).collect();
        assert_eq!(data, vec!["c", "b", "a"]);
        assert!(received.windows(2).all(|w| w[0].id() < w[1].id()));
        assert!(received
            .iter()
            .all(|e| e.event() == "update" && e.retry() == Some(DEFAULT_RETRY_MS)));

        cancel.cancel();
        assert_eq!(task.await.unwrap(), StreamState::ClosedCancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_item_per_tick() {
        let queue = PollingQueue::new();
        queue.push("message", "first").await;
        queue.push("message", "second").await;

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let adapter = PollingAdapter::new(queue.clone(), cancel.clone())
            .with_tick(Duration::from_millis(500));
        let task = tokio::spawn(adapter.run(tx));

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await.unwrap().data(), "second");
        assert_eq!(rx.recv().await.unwrap().data(), "first");
        assert!(start.elapsed() >= Duration::from_millis(500));

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_zero_tick_keeps_previous_interval() {
        let adapter = PollingAdapter::new(PollingQueue::new(), CancellationToken::new())
            .with_tick(Duration::from_millis(250))
            .with_tick(Duration::ZERO);
        assert_eq!(adapter.tick, Duration::from_millis(250));

        let adapter = PollingAdapter::new(PollingQueue::new(), CancellationToken::new())
            .with_tick(Duration::ZERO);
        assert_eq!(adapter.tick, DEFAULT_TICK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_stay_queued_while_connection_is_backed_up() {
        let queue = PollingQueue::new();
        for data in ["a", "b", "c"] {
            queue.push("message", data).await;
        }

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let adapter = PollingAdapter::new(queue.clone(), cancel.clone());
        let task = tokio::spawn(adapter.run(tx));

        // Nobody reads: one item fills the hand-off slot, the rest stay queued.
        tokio::time::sleep(DEFAULT_TICK * 5).await;
        assert_eq!(queue.len().await, 2);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), StreamState::ClosedCancelled);
        assert_eq!(rx.recv().await.unwrap().data(), "c");
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_observed_within_one_tick() {
        let queue = PollingQueue::new();
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let adapter = PollingAdapter::new(queue.clone(), cancel.clone());
        let task = tokio::spawn(adapter.run(tx));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        cancel.cancel();

        let state = tokio::time::timeout(DEFAULT_TICK, task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, StreamState::ClosedCancelled);

        // Items queued after the connection went away stay for the next consumer.
        queue.push("message", "late").await;
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_push_and_pop_never_lose_or_duplicate() {
        const PER_PRODUCER: usize = 500;
        let queue = PollingQueue::new();

        let producers: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|name| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for i in 0..PER_PRODUCER {
                        queue.push("message", format!("{name}-{i}")).await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let total = PER_PRODUCER * 2;
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                let delivered = delivered.clone();
                tokio::spawn(async move {
                    loop {
                        if delivered.lock().await.len() >= total {
                            break;
                        }
                        match queue.pop_latest().await {
                            Some((id, item)) => delivered.lock().await.push((id, item.data)),
                            None => tokio::task::yield_now().await,
                        }
                    }
                })
            })
            .collect();

        for handle in producers.into_iter().chain(consumers) {
            handle.await.unwrap();
        }

        let delivered = delivered.lock().await;
        assert_eq!(delivered.len(), total);

        let payloads: HashSet<&String> = delivered.iter().map(|(_, data)| data).collect();
        assert_eq!(payloads.len(), total, "an item was delivered twice");

        let ids: HashSet<u64> = delivered.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), total, "a sequence id was handed out twice");
        assert!(queue.is_empty().await);
    }
}
