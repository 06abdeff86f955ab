//! Heartbeat scheduling and staleness policy for Courtlink.
//!
//! Liveness is symmetric: every client publishes a heartbeat on a fixed
//! interval and evicts peers it has not heard from within a staleness
//! window derived from that same interval. Both sides of the policy live
//! here so the two numbers can never drift apart.
//!
//! # Disabled mode
//!
//! When `heartbeat_interval` is zero the scheduler is disabled and
//! [`HeartbeatScheduler::wait_for_beat`] pends forever. Tests that drive
//! the lobby by hand use this to keep heartbeats out of the picture.
//!
//! # Integration
//!
//! The scheduler sits inside the lobby coordinator's `tokio::select!`
//! loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         beat = scheduler.wait_for_beat() => {
//!             channel.publish(heartbeat).await?;
//!             store.sweep_stale(now, config.timeout_ms());
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Heartbeat cadence and staleness policy.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Interval between outgoing heartbeats. Zero disables the scheduler
    /// (no beats fire, no peer is ever considered stale).
    pub heartbeat_interval: Duration,
    /// A peer is stale after `staleness_multiple` intervals of silence.
    /// Must allow at least one lost heartbeat, so the floor is 2.
    pub staleness_multiple: u32,
    /// Random jitter (0–max ms) added to the *first* beat so clients
    /// that joined in the same instant don't heartbeat in lockstep.
    pub start_jitter_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            staleness_multiple: 3,
            start_jitter_ms: 250,
        }
    }
}

impl LivenessConfig {
    /// Minimum staleness multiple: one missed heartbeat must never
    /// evict a peer.
    pub const MIN_STALENESS_MULTIPLE: u32 = 2;

    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`HeartbeatScheduler::new`]. Rules:
    /// - `staleness_multiple` raised to [`Self::MIN_STALENESS_MULTIPLE`].
    /// - `start_jitter_ms` capped at the heartbeat interval.
    pub fn validated(mut self) -> Self {
        if self.staleness_multiple < Self::MIN_STALENESS_MULTIPLE {
            warn!(
                multiple = self.staleness_multiple,
                min = Self::MIN_STALENESS_MULTIPLE,
                "staleness_multiple below minimum, raising"
            );
            self.staleness_multiple = Self::MIN_STALENESS_MULTIPLE;
        }
        let interval_ms = self.heartbeat_interval.as_millis() as u64;
        if interval_ms > 0 && self.start_jitter_ms > interval_ms {
            self.start_jitter_ms = interval_ms;
        }
        self
    }

    /// Silence window after which a peer is considered gone.
    ///
    /// Zero when the scheduler is disabled; callers should skip the
    /// sweep entirely in that case.
    pub fn timeout(&self) -> Duration {
        self.heartbeat_interval * self.staleness_multiple
    }

    /// [`Self::timeout`] in milliseconds, the unit the presence ledger
    /// compares against.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout().as_millis() as u64
    }

    /// Whether heartbeats (and therefore staleness) are disabled.
    pub fn is_disabled(&self) -> bool {
        self.heartbeat_interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives the periodic heartbeat for a single lobby connection.
pub struct HeartbeatScheduler {
    config: LivenessConfig,
    /// When the next beat should fire. `None` when disabled.
    next_beat: Option<TokioInstant>,
    beat_count: u64,
    paused: bool,
}

impl HeartbeatScheduler {
    /// Create a scheduler from config.
    ///
    /// The first beat is scheduled with jitter so clients created in the
    /// same instant spread out.
    pub fn new(config: LivenessConfig) -> Self {
        let config = config.validated();

        let next_beat = if config.is_disabled() {
            debug!("heartbeat scheduler created in disabled mode");
            None
        } else {
            let jitter = if config.start_jitter_ms > 0 {
                let ms = rand::rng().random_range(0..config.start_jitter_ms);
                Duration::from_millis(ms)
            } else {
                Duration::ZERO
            };
            debug!(
                interval_ms = config.heartbeat_interval.as_millis() as u64,
                timeout_ms = config.timeout_ms(),
                "heartbeat scheduler created"
            );
            Some(TokioInstant::now() + config.heartbeat_interval + jitter)
        };

        Self {
            config,
            next_beat,
            beat_count: 0,
            paused: false,
        }
    }

    /// Wait until the next heartbeat is due. Returns the beat number
    /// (starts at 1).
    ///
    /// When disabled or paused this future pends forever; `tokio::select!`
    /// still processes its other branches.
    pub async fn wait_for_beat(&mut self) -> u64 {
        let next = match self.next_beat {
            Some(next) if !self.paused => next,
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        self.beat_count += 1;
        // Schedule from now, not from the deadline: a slow handler must
        // not produce a burst of make-up beats.
        self.next_beat = Some(TokioInstant::now() + self.config.heartbeat_interval);

        trace!(beat = self.beat_count, "heartbeat due");
        self.beat_count
    }

    /// Pause the beat loop (reconnect in progress — a half-dead
    /// connection must not keep publishing liveness).
    ///
    /// Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(beat = self.beat_count, "heartbeat scheduler paused");
        }
    }

    /// Resume after a pause. The next beat fires a full interval from
    /// now, not immediately.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if !self.config.is_disabled() {
                self.next_beat =
                    Some(TokioInstant::now() + self.config.heartbeat_interval);
            }
            debug!(beat = self.beat_count, "heartbeat scheduler resumed");
        }
    }

    /// Whether the scheduler is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the scheduler is disabled (zero interval).
    pub fn is_disabled(&self) -> bool {
        self.next_beat.is_none() && self.config.is_disabled()
    }

    /// Number of beats fired so far.
    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    /// The validated config this scheduler runs with.
    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }
}

// =========================================================================
// Tests
// =========================================================================
