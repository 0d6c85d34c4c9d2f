//! Write side and liveness of a single client connection.
//!
//! The connection handler owns the read half of a socket. The write half is
//! wrapped in a [`Transport`] so the broadcaster can push messages to it,
//! and a per-connection `CancellationToken` records whether the connection is
//! still usable. Either side may mark it closed; the other observes it.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use cmdchan_protocol::{CodecError, LineCodec, ServerMessage};

/// Default write timeout (10 seconds)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Type-erased write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors raised while writing to a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Transport closed")]
    Closed,
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        Self::Io(err.to_string())
    }
}

/// Shared handle to the write side of a connection.
///
/// Cheap to clone; all clones refer to the same socket and liveness flag.
#[derive(Clone)]
pub struct Transport {
    writer: Arc<Mutex<BoxedWriter>>,
    closed: CancellationToken,
    write_timeout: Duration,
}

impl Transport {
    /// Wraps a writer with the default write timeout.
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self::with_write_timeout(writer, DEFAULT_WRITE_TIMEOUT)
    }

    /// Wraps a writer with a custom write timeout.
    pub fn with_write_timeout(
        writer: impl AsyncWrite + Send + Unpin + 'static,
        write_timeout: Duration,
    ) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            closed: CancellationToken::new(),
            write_timeout,
        }
    }

    /// Returns true until the transport has been disconnected.
    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Marks the transport as disconnected. Idempotent.
    pub fn disconnect(&self) {
        self.closed.cancel();
    }

    /// Completes once the transport is disconnected.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Encodes and writes one message.
    ///
    /// Fails with `TransportError::Closed` without touching the socket if the
    /// transport was already disconnected.
    pub async fn send(&self, msg: ServerMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }

        let mut frame = BytesMut::new();
        LineCodec::new().encode(msg, &mut frame)?;

        let mut writer = self.writer.lock().await;

        match timeout(self.write_timeout, async {
            writer.write_all(&frame).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => {
                trace!(bytes = frame.len(), "Sent message");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Err(_) => Err(TransportError::WriteTimeout),
        }
    }

    /// Disconnects and shuts down the write side of the socket.
    pub async fn shutdown(&self) {
        self.disconnect();

        let mut writer = self.writer.lock().await;
        if let Err(e) = timeout(self.write_timeout, writer.shutdown()).await.unwrap_or(Ok(())) {
            trace!(error = %e, "Transport shutdown failed");
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.is_connected())
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
