//! cmdchan Core - Shared types for the command channel
//!
//! This crate provides the domain types shared between the wire protocol
//! and the daemon (cmdchand): client identities, identity validation, and
//! the interval source seam consumed by the broadcaster.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod identity;
pub mod interval;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use identity::{ClientId, ClientIdRules, IdentityValidator, MAX_CLIENT_ID_LEN};
pub use interval::{IntervalSource, StaticIntervals, DEFAULT_INTERVAL_SECS};
