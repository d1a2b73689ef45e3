//! Broker doubles shared by the unit tests in this crate.

use async_trait::async_trait;
use broker::{ChannelBroker, Error, Payload, Result, Subscription};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A broker that is never reachable.
pub(crate) struct UnreachableBroker;

#[async_trait]
impl ChannelBroker for UnreachableBroker {
    async fn subscribe(&self, _channel: &str) -> Result<Box<dyn Subscription>> {
        Err(Error::connection("connection refused"))
    }

    async fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<usize> {
        Err(Error::connection("connection refused"))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

/// What a scripted subscription does on each `next()` call.
pub(crate) enum Step {
    Payload(Payload),
    Fail,
    End,
}

/// A broker whose single subscription replays a fixed script.
pub(crate) struct ScriptedBroker {
    script: Mutex<Option<VecDeque<Step>>>,
    next_calls: Arc<AtomicUsize>,
    unsubscribe_calls: Arc<AtomicUsize>,
}

impl ScriptedBroker {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(Some(script.into())),
            next_calls: Arc::new(AtomicUsize::new(0)),
            unsubscribe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reads made by the subscription so far.
    pub(crate) fn next_calls(&self) -> usize {
        self.next_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelBroker for ScriptedBroker {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        let steps = self.script.lock().unwrap().take().unwrap_or_default();
        Ok(Box::new(ScriptedSubscription {
            channel: channel.to_string(),
            steps,
            next_calls: self.next_calls.clone(),
            unsubscribe_calls: self.unsubscribe_calls.clone(),
        }))
    }

    async fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedSubscription {
    channel: String,
    steps: VecDeque<Step>,
    next_calls: Arc<AtomicUsize>,
    unsubscribe_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next(&mut self) -> Result<Option<Payload>> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Payload(payload)) => Ok(Some(payload)),
            Some(Step::Fail) => Err(Error::connection("connection reset by peer")),
            Some(Step::End) => Ok(None),
            // Script exhausted: behave like a quiet channel.
            None => std::future::pending().await,
        }
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
