//! Server-Sent Events (SSE) streaming bridge.
//!
//! This crate turns a pub/sub broker subscription, or the in-memory polling
//! queue, into an ordered, cancellable stream of SSE frames for one HTTP
//! connection.
//!
//! # Architecture
//!
//! - **Envelope codec**: `Envelope` plus `encode`, rendering SSE wire frames.
//!   A `decode` counterpart exists for diagnostics and tests only.
//! - **Subscription adapter**: relays one broker subscription as `message`
//!   envelopes, in broker order, never reading ahead of the client. Always
//!   unsubscribes before it returns.
//! - **Polling adapter**: drains the process-wide `PollingQueue` one item per
//!   tick, newest item first, tagging each envelope with a process-wide
//!   sequence id and a retry hint.
//! - **Stream session**: one per HTTP connection. Runs the adapter on its own
//!   task and exposes a `SessionStream`; dropping that stream (the peer went
//!   away) cancels the adapter.
//! - **Connection registry**: live connections indexed by channel, used for
//!   diagnostics and to cancel everything on shutdown.
//!
//! # Message Flow
//!
//! 1. The web layer checks the `Accept` header with `session::negotiate`
//! 2. `Manager::open_stream` acquires the broker subscription (or not, for the
//!    polling queue) and registers the connection
//! 3. The adapter task pushes envelopes through a capacity-one channel,
//!    reserving the slot before it reads from its source
//! 4. The web layer maps each envelope onto an SSE event and adds keep-alive
//!    comments
//! 5. The stream ends when the broker closes the channel, the broker fails, or
//!    the peer disconnects
//!
//! # Example: Opening a stream
//!
//! ```rust,ignore
//! use sse::session::StreamSource;
//!
//! let mut stream = app_state
//!     .sse_manager
//!     .open_stream(StreamSource::Channel("default".to_string()))
//!     .await?;
//! while let Some(envelope) = stream.next().await {
//!     print!("{}", envelope.encode());
//! }
//! ```
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry with a per-channel index and type-safe ConnectionId
//! - `envelope`: Envelope and the SSE wire codec
//! - `manager`: process-scoped context that starts sessions and publishes
//! - `polling`: shared polling queue and its adapter
//! - `session`: negotiation, stream states and per-connection sessions
//! - `subscription`: broker subscription adapter

pub mod connection;
pub mod envelope;
pub mod error;
pub mod manager;
pub mod polling;
pub mod session;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use envelope::Envelope;
pub use error::{Error, ErrorKind, Result};
pub use manager::{Manager, Settings};
pub use session::{SessionStream, StreamSource, StreamState};
