//! Registry of live command channel connections.
//!
//! The registry is the only state shared by the accept loop, the connection
//! handlers and the broadcaster. Every structural change (insert, remove,
//! prune) and every full iteration happens under one async mutex, so no
//! task ever observes a half-modified collection.
//!
//! # Lifecycle
//!
//! ```text
//!  accept ──insert──▶ [ Connection, Connection, ... ] ◀──prune── Broadcaster
//!                              ▲
//!                              └──remove(id)── ConnectionHandler (on close)
//! ```
//!
//! Both removal paths are idempotent: removing an id that is already gone
//! is a no-op.
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()` or direct indexing in this module.

mod connection;

pub use connection::{Connection, ConnectionId};

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use cmdchan_core::ClientId;

/// Result of a prune-and-snapshot pass.
#[derive(Debug, Default)]
pub struct Sweep {
    /// Entries removed because their transport was no longer connected.
    pub pruned: usize,

    /// Entries still live after the prune, in registry order.
    pub live: Vec<Arc<Connection>>,
}

/// Errors raised by registry operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry full (max: {max} connections)")]
    Full { max: usize },
}

/// Cheap-to-clone handle to the shared connection list.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<Vec<Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns the new entry count.
    pub async fn insert(&self, connection: Arc<Connection>) -> usize {
        let mut connections = self.connections.lock().await;
        connections.push(connection);
        connections.len()
    }

    /// Adds a connection unless `max` entries are already present.
    ///
    /// The capacity check and the insert happen under the same lock.
    pub async fn try_insert(
        &self,
        connection: Arc<Connection>,
        max: usize,
    ) -> Result<usize, RegistryError> {
        let mut connections = self.connections.lock().await;
        if connections.len() >= max {
            return Err(RegistryError::Full { max });
        }
        connections.push(connection);
        Ok(connections.len())
    }

    /// Removes the entry with `id`. Returns false if it was already absent.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().await;
        let before = connections.len();
        connections.retain(|c| c.id() != id);
        let removed = connections.len() != before;
        if removed {
            debug!(connection = %id, "Removed connection from registry");
        }
        removed
    }

    /// Removes every entry whose transport is no longer connected.
    pub async fn prune_disconnected(&self) -> usize {
        let mut connections = self.connections.lock().await;
        Self::prune_locked(&mut connections)
    }

    /// Prunes dead entries and snapshots the survivors in one lock scope.
    pub async fn prune_and_snapshot(&self) -> Sweep {
        let mut connections = self.connections.lock().await;
        let pruned = Self::prune_locked(&mut connections);
        Sweep {
            pruned,
            live: connections.clone(),
        }
    }

    fn prune_locked(connections: &mut Vec<Arc<Connection>>) -> usize {
        let before = connections.len();
        connections.retain(|c| {
            let live = c.is_connected();
            if !live {
                debug!(connection = %c.id(), peer = %c.peer(), "Pruning disconnected connection");
            }
            live
        });
        before - connections.len()
    }

    /// Returns the current number of entries, live or not yet pruned.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Returns the identity of every entry, in registry order.
    pub async fn identities(&self) -> Vec<Option<ClientId>> {
        let connections = self.connections.lock().await;
        let mut identities = Vec::with_capacity(connections.len());
        for connection in connections.iter() {
            identities.push(connection.identity().await);
        }
        identities
    }
}
