//! Connection handler for individual client connections.
//!
//! Each accepted socket gets its own `ConnectionHandler` task that:
//! - Reads bytes and frames them into lines with [`LineCodec`]
//! - Hands every completed line to the command processor
//! - Closes the connection on EOF, I/O error, oversized line or rejected identity
//!
//! The handler never writes to the client; interval pushes come from the
//! broadcaster through the shared [`Transport`](crate::transport::Transport).
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in a graceful disconnect

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use cmdchan_core::{ClientId, DomainError, IdentityValidator};
use cmdchan_protocol::{CodecError, LineCodec};

use super::command::process_line;
use crate::registry::{Connection, ConnectionRegistry};
use crate::transport::TransportError;

/// Initial read buffer capacity
const READ_CHUNK: usize = 512;

/// Connection handler for a single client.
pub struct ConnectionHandler<R> {
    /// Read half of the socket
    reader: R,

    /// Bytes received but not yet resolved into a line
    buffer: BytesMut,

    /// Line framing state
    codec: LineCodec,

    /// Shared state also visible to the broadcaster
    connection: Arc<Connection>,

    /// Registry the connection was inserted into
    registry: ConnectionRegistry,

    /// Identity validator for `Client-ID:` commands
    validator: Arc<dyn IdentityValidator>,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the client socket
    /// * `connection` - Connection state, already inserted into `registry`
    /// * `registry` - Registry to remove the connection from on close
    /// * `validator` - Validator applied to registered identities
    /// * `max_line_length` - Longest accepted line, in bytes
    pub fn new(
        reader: R,
        connection: Arc<Connection>,
        registry: ConnectionRegistry,
        validator: Arc<dyn IdentityValidator>,
        max_line_length: usize,
    ) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            codec: LineCodec::with_max_length(max_line_length),
            connection,
            registry,
            validator,
        }
    }

    /// Runs the handler until the connection closes.
    ///
    /// On return the transport is disconnected and the entry has been
    /// removed from the registry. Returns the last registered identity.
    pub async fn run(mut self) -> Option<ClientId> {
        let id = self.connection.id();
        debug!(connection = %id, peer = %self.connection.peer(), "New client connected");

        match self.receive_loop().await {
            Ok(()) => {
                debug!(connection = %id, "Client sent EOF");
            }
            Err(ConnectionError::Transport(TransportError::Closed)) => {
                debug!(connection = %id, "Transport closed by server");
            }
            Err(e @ (ConnectionError::InvalidIdentity(_) | ConnectionError::LineTooLong { .. })) => {
                warn!(
                    connection = %id,
                    peer = %self.connection.peer(),
                    error = %e,
                    "Closing connection after protocol violation"
                );
            }
            Err(e) => {
                debug!(connection = %id, error = %e, "Connection closed");
            }
        }

        self.close().await;

        let client_id = self.connection.identity().await;
        info!(connection = %id, client_id = ?client_id, "Client disconnected");
        client_id
    }

    /// Receiving state: read, frame, dispatch, repeat.
    async fn receive_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(line) = self.codec.decode(&mut self.buffer)? {
                process_line(&self.connection, self.validator.as_ref(), &line).await?;
            }

            self.buffer.reserve(READ_CHUNK);

            let transport = self.connection.transport().clone();
            let bytes_read = tokio::select! {
                biased;

                _ = transport.closed() => {
                    return Err(TransportError::Closed.into());
                }

                result = self.reader.read_buf(&mut self.buffer) => {
                    result.map_err(|e| ConnectionError::Io(e.to_string()))?
                }
            };

            if bytes_read == 0 {
                return Ok(());
            }
        }
    }

    /// Closed state: disconnect the transport and leave the registry.
    async fn close(&self) {
        self.connection.transport().shutdown().await;
        self.registry.remove(self.connection.id()).await;
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Line too long: {len} bytes (max: {max})")]
    LineTooLong { len: usize, max: usize },

    #[error("Rejected identity: {0}")]
    InvalidIdentity(#[from] DomainError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<CodecError> for ConnectionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::LineTooLong { len, max } => Self::LineTooLong { len, max },
            CodecError::Io(e) => Self::Io(e.to_string()),
        }
    }
}
