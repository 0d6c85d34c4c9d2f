//! Per-connection state held in the registry.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::RwLock;

use cmdchan_core::ClientId;

use crate::transport::Transport;

/// Server-assigned identifier of an accepted connection.
///
/// Unique for the lifetime of the process; used to remove entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State of one accepted connection.
///
/// Shared between its connection handler, which sets the identity, and the
/// broadcaster, which reads the identity and writes through the transport.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    transport: Transport,
    identity: RwLock<Option<ClientId>>,
}

impl Connection {
    /// Creates a connection with no identity yet.
    pub fn new(id: ConnectionId, peer: SocketAddr, transport: Transport) -> Self {
        Self {
            id,
            peer,
            transport,
            identity: RwLock::new(None),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Liveness is derived from the transport, never stored separately.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Returns the registered identity, if any.
    pub async fn identity(&self) -> Option<ClientId> {
        self.identity.read().await.clone()
    }

    /// Sets or overwrites the identity, returning the previous one.
    pub async fn set_identity(&self, client_id: ClientId) -> Option<ClientId> {
        self.identity.write().await.replace(client_id)
    }
}
