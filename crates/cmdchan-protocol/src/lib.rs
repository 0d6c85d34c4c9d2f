//! cmdchan Protocol - Wire protocol for the command channel
//!
//! The channel speaks newline-delimited ASCII text in both directions:
//!
//! ```text
//! client -> server   Client-ID: <id>\n        (CR before LF optional)
//! server -> client   Interval=<seconds>\r\n
//! ```
//!
//! This crate provides the line framing codec and the typed forms of both
//! message directions.

pub mod codec;
pub mod command;
pub mod message;

pub use codec::{CodecError, LineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use command::{ClientCommand, CLIENT_ID_PREFIX};
pub use message::ServerMessage;
