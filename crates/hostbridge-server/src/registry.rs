//! Shared connection registry.
//!
//! Inserted from the accept thread, read and pruned from host-thread code
//! (pump, broadcast), so the map must be safe for concurrent access.

use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::{Connection, ConnectionId};

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry::default()
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id().clone(), conn);
    }

    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop entries whose peer went away between cleanup cycles.
    pub fn prune_dead(&self) {
        self.connections.retain(|_, conn| conn.is_live());
    }

    /// Snapshot of the live connections, for broadcast.
    pub fn live_connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_live())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// All connections, live or not. Used during shutdown.
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn clear(&self) {
        self.connections.clear();
    }
}
