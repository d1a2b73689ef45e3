use crate::session::StreamSource;
use dashmap::DashMap;
use log::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a live streaming connection is attached to, and how to stop it.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub source: StreamSource,
    pub cancel: CancellationToken,
}

/// Registry of live streaming connections with a per-channel secondary index.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: broker channel name -> connections streaming it
    channel_index: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            channel_index: DashMap::new(),
        }
    }

    /// Register a new connection - O(1)
    pub fn register(&self, source: StreamSource, cancel: CancellationToken) -> ConnectionId {
        let connection_id = ConnectionId::new();

        if let StreamSource::Channel(channel) = &source {
            self.channel_index
                .entry(channel.clone())
                .or_default()
                .insert(connection_id.clone());
        }

        self.connections
            .insert(connection_id.clone(), ConnectionInfo { source, cancel });

        connection_id
    }

    /// Unregister a connection - O(1)
    pub fn unregister(&self, connection_id: &ConnectionId) {
        if let Some((_, info)) = self.connections.remove(connection_id) {
            if let StreamSource::Channel(channel) = info.source {
                if let Some(mut entry) = self.channel_index.get_mut(&channel) {
                    entry.remove(connection_id);

                    // Clean up empty channel entries
                    if entry.is_empty() {
                        drop(entry); // Release lock before removal
                        self.channel_index.remove(&channel);
                    }
                }
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live connections streaming `channel`.
    pub fn channel_count(&self, channel: &str) -> usize {
        self.channel_index
            .get(channel)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// Live connection counts keyed by broker channel name.
    pub fn channel_counts(&self) -> HashMap<String, usize> {
        self.channel_index
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    /// Number of live connections fed by the polling queue.
    pub fn polling_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().source == StreamSource::PollingQueue)
            .count()
    }

    /// Signal every live connection to stop. Each one unregisters itself once
    /// its adapter has released its resources.
    pub fn cancel_all(&self) {
        let count = self.connections.len();
        for entry in self.connections.iter() {
            entry.value().cancel.cancel();
        }
        if count > 0 {
            info!("Cancelled {count} streaming connection(s)");
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a connection registered for as long as it lives.
///
/// Unregisters on drop, so a task that panics still leaves the registry clean.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
}

impl Registration {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        source: StreamSource,
        cancel: CancellationToken,
    ) -> Self {
        let connection_id = registry.register(source, cancel);
        Self {
            registry,
            connection_id,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.connection_id);
    }
}
