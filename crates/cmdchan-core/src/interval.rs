//! Source of per-client polling intervals.
//!
//! The broadcaster asks an [`IntervalSource`] for every live connection on
//! each sweep. The production source is owned by the data store; this crate
//! ships [`StaticIntervals`], a table-backed source used when the daemon runs
//! standalone.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::identity::ClientId;

/// Interval handed to clients with no specific entry, in seconds.
pub const DEFAULT_INTERVAL_SECS: u32 = 60;

/// Provides the polling interval a client should use.
#[async_trait]
pub trait IntervalSource: Send + Sync {
    /// Returns the interval for `client`.
    ///
    /// `None` means the connection never registered an identity. It is still
    /// asked for, and still receives, an interval.
    ///
    /// Intervals are unsigned. A backing store that keeps signed values must
    /// convert them here and report a negative one as
    /// `DomainError::IntervalUnavailable` rather than pass it on.
    async fn update_interval(&self, client: Option<&ClientId>) -> DomainResult<u32>;
}

/// Interval table with a fallback default.
#[derive(Debug, Clone)]
pub struct StaticIntervals {
    default: u32,
    per_client: HashMap<ClientId, u32>,
}

impl StaticIntervals {
    /// Creates a table where every client gets `default`.
    pub fn new(default: u32) -> Self {
        Self {
            default,
            per_client: HashMap::new(),
        }
    }

    /// Adds or replaces the interval for one client.
    #[must_use]
    pub fn with_client(mut self, client: impl Into<ClientId>, interval: u32) -> Self {
        self.per_client.insert(client.into(), interval);
        self
    }

    /// Returns the fallback interval.
    pub fn default_interval(&self) -> u32 {
        self.default
    }

    /// Number of per-client overrides.
    pub fn len(&self) -> usize {
        self.per_client.len()
    }

    /// Returns true if there are no per-client overrides.
    pub fn is_empty(&self) -> bool {
        self.per_client.is_empty()
    }
}

impl Default for StaticIntervals {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_SECS)
    }
}

impl<K: Into<ClientId>> FromIterator<(K, u32)> for StaticIntervals {
    fn from_iter<I: IntoIterator<Item = (K, u32)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |table, (k, v)| table.with_client(k, v))
    }
}

#[async_trait]
impl IntervalSource for StaticIntervals {
    async fn update_interval(&self, client: Option<&ClientId>) -> DomainResult<u32> {
        let interval = client
            .and_then(|id| self.per_client.get(id).copied())
            .unwrap_or(self.default);

        tracing::trace!(client = ?client, interval, "Resolved update interval");
        Ok(interval)
    }
}
