//! Concurrent registry of active connections.
//!
//! [`ConnectionRegistry`] stores every open connection in a `HashMap`
//! behind a [`tokio::sync::RwLock`]. It is the single owner of connection
//! membership: register, remove and snapshot all go through it, and the
//! broadcast path only ever sees snapshots, never the live map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::ConnectionId;
use super::connection::{BoxedWriter, Connection, ConnectionSummary};

/// Central store for all open connections.
///
/// # Concurrency
///
/// - Snapshots and lookups take the read lock and may run concurrently.
/// - Register and remove take the write lock briefly; closing a removed
///   transport happens after the lock is released.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its fresh identifier.
    pub async fn register(&self, peer_addr: SocketAddr, writer: BoxedWriter) -> ConnectionId {
        let mut map = self.connections.write().await;
        let mut id = ConnectionId::new();
        while map.contains_key(&id) {
            id = ConnectionId::new();
        }
        map.insert(id, Arc::new(Connection::new(id, peer_addr, writer)));
        tracing::debug!(connection_id = %id, peer = %peer_addr, total = map.len(), "connection registered");
        id
    }

    /// Returns the connection registered under `id`, if any.
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Removes the connection and closes its transport.
    ///
    /// Returns `false` if no connection was registered under `id`.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);
        match removed {
            Some(connection) => {
                connection.close().await;
                tracing::debug!(connection_id = %id, "connection removed");
                true
            }
            None => false,
        }
    }

    /// Returns a point-in-time copy of all registered connections.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Removes and closes every connection, returning how many there were.
    pub async fn clear(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut map = self.connections.write().await;
            map.drain().map(|(_, connection)| connection).collect()
        };
        for connection in &drained {
            connection.close().await;
        }
        drained.len()
    }

    /// Returns summaries of all connections, oldest first.
    pub async fn summaries(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<ConnectionSummary> = self
            .connections
            .read()
            .await
            .values()
            .map(|connection| connection.summary())
            .collect();
        summaries.sort_by_key(|summary| summary.connected_at);
        summaries
    }

    /// Returns the number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn test_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40001))
    }

    fn writer() -> BoxedWriter {
        let (_client, server) = tokio::io::duplex(64);
        Box::new(server)
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(test_addr(), writer()).await;

        let Some(conn) = registry.get(id).await else {
            panic!("registered connection missing");
        };
        assert_eq!(conn.id(), id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_closes_and_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(test_addr(), writer()).await;
        let Some(conn) = registry.get(id).await else {
            panic!("registered connection missing");
        };

        assert!(registry.remove(id).await);
        assert!(conn.is_closed());
        assert!(!registry.remove(id).await);
        assert!(registry.get(id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        let _ = registry.register(test_addr(), writer()).await;
        assert!(!registry.remove(ConnectionId::new()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_changes() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(test_addr(), writer()).await;
        let _b = registry.register(test_addr(), writer()).await;

        let snapshot = registry.snapshot().await;
        registry.remove(a).await;
        let _c = registry.register(test_addr(), writer()).await;

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|conn| conn.id() == a && conn.is_closed()));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn clear_closes_everything() {
        let registry = ConnectionRegistry::new();
        for _ in 0..5 {
            let _ = registry.register(test_addr(), writer()).await;
        }
        let snapshot = registry.snapshot().await;

        assert_eq!(registry.clear().await, 5);
        assert!(registry.is_empty().await);
        assert!(snapshot.iter().all(|conn| conn.is_closed()));
        assert_eq!(registry.clear().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_open_close_cycles_stay_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();
        for i in 0..100 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let id = registry.register(test_addr(), writer()).await;
                if i % 2 == 0 {
                    assert!(registry.remove(id).await);
                }
                id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let Ok(id) = handle.await else {
                panic!("task panicked");
            };
            assert!(ids.insert(id), "duplicate identifier {id}");
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 50);
        let live: HashSet<ConnectionId> = snapshot.iter().map(|conn| conn.id()).collect();
        assert_eq!(live.len(), 50);
        assert!(live.is_subset(&ids));
        assert!(snapshot.iter().all(|conn| !conn.is_closed()));
    }
}
