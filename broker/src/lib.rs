//! Pub/sub broker adapters for the SSE gateway.
//!
//! This crate is the leaf of the gateway: it hides the external message bus
//! behind two small traits so the streaming bridge never talks to a concrete
//! broker client.
//!
//! # Architecture
//!
//! - **ChannelBroker**: opens subscriptions to named channels and publishes
//!   payloads to them. Shared process-wide behind an `Arc`.
//! - **Subscription**: one subscriber's attachment to one channel. Yields raw
//!   payloads in broker delivery order until the channel closes.
//! - **RedisBroker**: Redis `PUBLISH`/`SUBSCRIBE` backed implementation.
//! - **MemoryBroker**: in-process implementation used when no broker URL is
//!   configured, and by tests.
//!
//! Channels are pure routing keys: every subscriber attached to a channel sees
//! every message published on it after it attached. There is no backlog or
//! replay.

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod redis_broker;

pub use error::{Error, ErrorKind, Result};
pub use memory::MemoryBroker;
pub use redis_broker::{RedisBroker, RedisSettings};

/// Raw message body as delivered by the broker.
pub type Payload = Vec<u8>;

/// A process-wide handle to a pub/sub broker.
#[async_trait]
pub trait ChannelBroker: Send + Sync {
    /// Attach a new subscriber to `channel`.
    ///
    /// Fails with a connection error if the broker is unreachable.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>>;

    /// Publish `payload` on `channel`, returning how many subscribers received it.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize>;

    /// Short name used in log output.
    fn name(&self) -> &'static str;
}

/// One subscriber's attachment to one channel.
///
/// Owned by exactly one consumer. Callers must invoke [`Subscription::unsubscribe`]
/// once they are done, whatever the reason they stopped reading.
#[async_trait]
pub trait Subscription: Send {
    /// The channel this subscription is attached to.
    fn channel(&self) -> &str;

    /// Wait for the next payload.
    ///
    /// Returns `Ok(None)` once the subscription has been closed by either side,
    /// and an error if the broker connection failed while waiting.
    async fn next(&mut self) -> Result<Option<Payload>>;

    /// Detach from the channel. Idempotent; safe after the subscription closed.
    async fn unsubscribe(&mut self) -> Result<()>;
}
