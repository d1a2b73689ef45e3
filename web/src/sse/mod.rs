//! SSE HTTP handlers for the web layer.
//!
//! This module contains only the Axum handlers for the SSE endpoints.
//! The streaming machinery (Manager, sessions, adapters, envelope codec)
//! lives in the `sse` crate.

pub mod handler;
