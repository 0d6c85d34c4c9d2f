//! Messages pushed from the server to clients.

use std::fmt;

/// Server to client message.
///
/// Rendered without its line terminator; [`crate::LineCodec`] appends `\r\n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    /// Polling interval the client should use, in seconds.
    Interval(u32),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(secs) => write!(f, "Interval={secs}"),
        }
    }
}
