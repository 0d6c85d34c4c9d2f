//! Line framing for the command channel.
//!
//! Bytes from the socket are appended to a growing buffer; every `\n` found
//! completes one line. A single trailing `\r` is dropped, so both `\n` and
//! `\r\n` clients are accepted. Partial lines stay buffered across reads.
//!
//! Only that one trailing `\r` is removed. A `\r` anywhere else in the line
//! is kept, so it reaches the identity validator and fails there, instead of
//! being silently dropped.
//!
//! Unlike an unbounded reader, the codec enforces a maximum line length:
//! a sender that withholds the newline gets `CodecError::LineTooLong` once
//! the buffered partial line exceeds the limit.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::ServerMessage;

/// Default maximum line length in bytes (excluding the terminator).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Errors produced while framing lines.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Line too long: {len} bytes (max: {max})")]
    LineTooLong { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Newline framing codec.
///
/// Decodes `String` lines and encodes [`ServerMessage`]s.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Bytes already scanned for a newline, so a fragmented line is not
    /// rescanned from the start on every read.
    next_index: usize,

    max_length: usize,
}

impl LineCodec {
    /// Creates a codec with [`DEFAULT_MAX_LINE_LENGTH`].
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates a codec with a custom maximum line length.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        let newline = buf
            .get(self.next_index..)
            .and_then(|unscanned| unscanned.iter().position(|b| *b == b'\n'))
            .map(|offset| self.next_index + offset);

        let Some(pos) = newline else {
            self.next_index = buf.len();
            // A trailing `\r` may still be completed by its `\n`.
            let pending = match buf.last() {
                Some(b'\r') => buf.len() - 1,
                _ => buf.len(),
            };
            if pending > self.max_length {
                return Err(CodecError::LineTooLong {
                    len: pending,
                    max: self.max_length,
                });
            }
            return Ok(None);
        };

        self.next_index = 0;

        let line = buf.split_to(pos);
        buf.advance(1);

        let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
        if line.len() > self.max_length {
            return Err(CodecError::LineTooLong {
                len: line.len(),
                max: self.max_length,
            });
        }

        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }
}

impl Encoder<ServerMessage> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: ServerMessage, dst: &mut BytesMut) -> Result<(), CodecError> {
        let line = msg.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
