//! Periodic interval broadcaster.
//!
//! Every period the broadcaster runs one sweep:
//! 1. Prune registry entries whose transport is no longer connected
//! 2. Ask the interval source for each remaining connection's interval
//! 3. Push `Interval=<n>\r\n` to that connection
//!
//! A failure for one connection is logged and skipped; it never stops the
//! sweep or later sweeps. A failed send disconnects the transport so the
//! connection's handler stops and the next sweep prunes the entry.
//!
//! The prune and the snapshot of live entries share one registry lock scope.
//! Lookups and sends run after the lock is released, so a slow client never
//! delays accepts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cmdchan_core::{DomainError, IntervalSource};
use cmdchan_protocol::ServerMessage;

use crate::config::MAX_PERIOD_SECS;
use crate::registry::{Connection, ConnectionRegistry};
use crate::transport::TransportError;

/// Shortest period a broadcaster will tick at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Outcome of a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed because they were no longer connected
    pub pruned: usize,

    /// Entries left in the registry after pruning
    pub live: usize,

    /// Intervals successfully pushed
    pub sent: usize,

    /// Entries whose lookup or send failed
    pub failed: usize,
}

/// Failure to deliver an interval to one connection.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Interval lookup failed: {0}")]
    Interval(#[from] DomainError),

    #[error("Send failed: {0}")]
    Send(#[from] TransportError),
}

/// Pushes polling intervals to every live connection on a fixed period.
pub struct Broadcaster {
    registry: ConnectionRegistry,
    source: Arc<dyn IntervalSource>,
    period: Duration,
    cancel_token: CancellationToken,
}

impl Broadcaster {
    /// Creates a broadcaster.
    ///
    /// `period` is clamped to between 1ms and [`MAX_PERIOD_SECS`].
    pub fn new(
        registry: ConnectionRegistry,
        source: Arc<dyn IntervalSource>,
        period: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        let clamped = period.clamp(MIN_PERIOD, Duration::from_secs(MAX_PERIOD_SECS));
        if clamped != period {
            warn!(
                requested_secs = period.as_secs_f64(),
                period_secs = clamped.as_secs_f64(),
                "Broadcast period out of range, clamped"
            );
        }

        Self {
            registry,
            source,
            period: clamped,
            cancel_token,
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Sweeps once per period until the cancellation token fires.
    ///
    /// The first sweep happens one full period after start.
    pub async fn run(self) {
        let now = Instant::now();
        let first = now.checked_add(self.period).unwrap_or(now);
        let mut tick = interval_at(first, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = self.period.as_secs_f64(), "Broadcaster started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Broadcaster shutting down");
                    break;
                }

                _ = tick.tick() => {
                    self.sweep().await;
                }
            }
        }

        debug!("Broadcaster task completed");
    }

    /// Runs one prune-and-push cycle.
    pub async fn sweep(&self) -> SweepReport {
        let sweep = self.registry.prune_and_snapshot().await;

        info!(
            active = sweep.live.len(),
            pruned = sweep.pruned,
            "Active command channel connections"
        );

        let mut report = SweepReport {
            pruned: sweep.pruned,
            live: sweep.live.len(),
            ..SweepReport::default()
        };

        for connection in &sweep.live {
            match self.push_interval(connection).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        connection = %connection.id(),
                        peer = %connection.peer(),
                        error = %e,
                        "Failed to push interval"
                    );
                }
            }
        }

        report
    }

    /// Looks up and sends the interval for one connection.
    async fn push_interval(&self, connection: &Connection) -> Result<(), BroadcastError> {
        let client_id = connection.identity().await;
        let interval = self.source.update_interval(client_id.as_ref()).await?;

        if let Err(e) = connection.transport().send(ServerMessage::Interval(interval)).await {
            connection.transport().disconnect();
            return Err(e.into());
        }

        debug!(
            connection = %connection.id(),
            client_id = ?client_id,
            interval,
            "Sent interval"
        );
        Ok(())
    }
}
