//! Client identities and their validation.
//!
//! A client announces itself on the command channel with a `Client-ID:` line.
//! The raw value is checked by an [`IdentityValidator`] before it is ever
//! attached to a connection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Maximum length of a client identity, in bytes.
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Identity a client registers on the command channel.
///
/// Used as the lookup key into the interval source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Creates a new ClientId from a string.
    ///
    /// Note: This does not validate. Connection handlers obtain their
    /// identities from an [`IdentityValidator`] instead.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checks a raw identity string and turns it into a [`ClientId`].
///
/// Implementations must be callable concurrently from every connection task.
pub trait IdentityValidator: Send + Sync {
    /// Validates `raw`, returning `DomainError::InvalidIdentity` when malformed.
    fn validate(&self, raw: &str) -> DomainResult<ClientId>;
}

/// Default identity rules.
///
/// An identity is non-empty, at most [`MAX_CLIENT_ID_LEN`] bytes, and made of
/// ASCII alphanumerics plus `-`, `_` and `.`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIdRules;

impl ClientIdRules {
    fn is_allowed(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
    }
}

impl IdentityValidator for ClientIdRules {
    fn validate(&self, raw: &str) -> DomainResult<ClientId> {
        if raw.is_empty() {
            return Err(DomainError::invalid_identity(raw, "identity is empty"));
        }

        if raw.len() > MAX_CLIENT_ID_LEN {
            return Err(DomainError::invalid_identity(
                raw,
                format!("longer than {MAX_CLIENT_ID_LEN} bytes"),
            ));
        }

        if let Some(bad) = raw.chars().find(|c| !Self::is_allowed(*c)) {
            return Err(DomainError::invalid_identity(
                raw,
                format!("contains {bad:?}"),
            ));
        }

        Ok(ClientId::new(raw))
    }
}
