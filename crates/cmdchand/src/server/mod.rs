//! TCP listener for the command channel.
//!
//! The server:
//! - Binds the configured TCP port (failure is fatal at startup)
//! - Registers every accepted socket in the [`ConnectionRegistry`]
//! - Spawns a [`ConnectionHandler`] for each client
//! - Runs the [`Broadcaster`] alongside the accept loop
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ CommandChannelServer │
//! │                      │
//! │     TcpListener      │
//! └──────────┬───────────┘
//!            │ accept()
//!            ▼
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │  ConnectionRegistry  │◀────│  ConnectionHandler   │
//! │   (insert / remove)  │     │    (per client)      │
//! └──────────▲───────────┘     └──────────────────────┘
//!            │ prune + push
//! ┌──────────┴───────────┐
//! │     Broadcaster      │
//! └──────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod command;
mod connection;

pub use command::process_line;
pub use connection::{ConnectionError, ConnectionHandler};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cmdchan_core::{IdentityValidator, IntervalSource};

use crate::broadcast::Broadcaster;
use crate::config::ChannelConfig;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry, RegistryError};
use crate::transport::Transport;

/// Pending-connection backlog passed to `listen(2)`
pub const LISTEN_BACKLOG: u32 = 100;

/// TCP server for the command channel.
pub struct CommandChannelServer {
    /// Listener, limits and timing configuration
    config: ChannelConfig,

    /// Live connections, shared with handlers and the broadcaster
    registry: ConnectionRegistry,

    /// Validator for `Client-ID:` values
    validator: Arc<dyn IdentityValidator>,

    /// Source of per-client intervals for the broadcaster
    source: Arc<dyn IntervalSource>,

    /// Process-wide shutdown signal
    cancel_token: CancellationToken,

    /// Connection counter for generating connection IDs
    connection_counter: AtomicU64,
}

impl CommandChannelServer {
    /// Creates a new command channel server.
    ///
    /// # Arguments
    ///
    /// * `config` - Listener, limits and timing configuration
    /// * `registry` - Registry accepted connections are inserted into
    /// * `validator` - Validator for registered identities
    /// * `source` - Interval source queried by the broadcaster
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        config: ChannelConfig,
        registry: ConnectionRegistry,
        validator: Arc<dyn IdentityValidator>,
        source: Arc<dyn IntervalSource>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            validator,
            source,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Requests shutdown of the accept loop and the broadcaster.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Binds the configured address.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        bind_listener(self.config.socket_addr())
    }

    /// Runs the server.
    ///
    /// Binds, starts the broadcaster, and accepts connections until the
    /// cancellation token is triggered. A bind failure is returned before
    /// anything is accepted.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Command channel failed to bind");
                return Err(e);
            }
        };

        let broadcaster = self.spawn_broadcaster();
        let result = self.serve(listener).await;

        if let Err(e) = broadcaster.await {
            warn!(error = %e, "Broadcaster task ended abnormally");
        }

        result
    }

    /// Spawns the periodic broadcaster on this server's registry.
    pub fn spawn_broadcaster(&self) -> JoinHandle<()> {
        Broadcaster::new(
            self.registry.clone(),
            Arc::clone(&self.source),
            self.config.broadcast_interval(),
            self.cancel_token.clone(),
        )
        .spawn()
    }

    /// Accepts connections on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr().ok();
        info!(addr = ?local_addr, "Command channel listening");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, ConnectionId::new(conn_num)).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        let remaining = self.registry.len().await;
        info!(remaining, "Command channel stopped accepting");
        Ok(())
    }

    /// Registers a new socket and spawns its handler task.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, id: ConnectionId) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let transport = Transport::with_write_timeout(writer, self.config.write_timeout());
        let connection = Arc::new(Connection::new(id, peer, transport));

        match self
            .registry
            .try_insert(Arc::clone(&connection), self.config.max_connections)
            .await
        {
            Ok(count) => {
                debug!(connection = %id, peer = %peer, total = count, "Accepted connection");
            }
            Err(RegistryError::Full { max }) => {
                warn!(peer = %peer, max, "Too many connections, refusing client");
                connection.transport().shutdown().await;
                return;
            }
        }

        let handler = ConnectionHandler::new(
            reader,
            connection,
            self.registry.clone(),
            Arc::clone(&self.validator),
            self.config.max_line_length,
        );

        tokio::spawn(handler.run());
    }
}

/// Binds a TCP listener with [`LISTEN_BACKLOG`].
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let map_err = |e: std::io::Error| ServerError::Bind {
        addr,
        error: e.to_string(),
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(map_err)?;

    socket.set_reuseaddr(true).map_err(map_err)?;
    socket.bind(addr).map_err(map_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(map_err)
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: SocketAddr::from(([0, 0, 0, 0], 7070)),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:7070"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let first = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        let addr = first.local_addr().unwrap();

        // A second listener on a port that is actively listening must fail,
        // SO_REUSEADDR notwithstanding.
        let err = bind_listener(addr).unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[test]
    fn test_backlog_constant() {
        assert_eq!(LISTEN_BACKLOG, 100);
    }
}
