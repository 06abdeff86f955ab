//! Reconnection supervisor: a pure state machine over the connection's
//! lifecycle.
//!
//! The supervisor owns no timers and touches no sockets — it only
//! decides *whether* another attempt is allowed. The coordinator drives
//! it: on channel loss it asks for the first attempt, after each failed
//! connect it asks for the next, and once the budget is exhausted the
//! supervisor parks in [`ReconnectState::Failed`] and stays there.
//!
//! Keeping the policy synchronous makes the attempt-counting rules
//! testable without a runtime.

use std::time::Duration;

use tracing::{debug, warn};

/// Reconnection attempt budget and pacing.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum connect attempts after a loss before giving up.
    pub max_attempts: u32,
    /// Delay before each attempt.
    pub retry_delay: Duration,
    /// Grace period surfaced to the UI once reconnection has failed,
    /// before the client abandons the session.
    pub failure_countdown: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(3),
            failure_countdown: Duration::from_secs(10),
        }
    }
}

impl ReconnectConfig {
    /// Fix any unusable values. A zero attempt budget would turn every
    /// transient drop into an instant failure, so the floor is 1.
    pub fn validated(mut self) -> Self {
        if self.max_attempts == 0 {
            warn!("max_attempts is 0, raising to 1");
            self.max_attempts = 1;
        }
        self
    }
}

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// Connected and healthy.
    Stable,
    /// Connection lost; attempt `attempt` (1-based) is pending or in
    /// flight.
    Reconnecting { attempt: u32 },
    /// The attempt budget is spent. Terminal — only a fresh lobby
    /// connection leaves this state.
    Failed,
}

/// Tracks reconnect attempts against the configured budget.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    config: ReconnectConfig,
    state: ReconnectState,
}

impl ReconnectSupervisor {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config: config.validated(),
            state: ReconnectState::Stable,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Records a connection loss.
    ///
    /// Returns the attempt number to schedule (always 1), or `None` if a
    /// reconnect is already in progress or the supervisor has already
    /// failed — repeated loss signals for the same outage are absorbed.
    pub fn on_connection_lost(&mut self) -> Option<u32> {
        match self.state {
            ReconnectState::Stable => {
                self.state = ReconnectState::Reconnecting { attempt: 1 };
                debug!(max = self.config.max_attempts, "connection lost, reconnecting");
                Some(1)
            }
            ReconnectState::Reconnecting { .. } | ReconnectState::Failed => None,
        }
    }

    /// Records a failed connect attempt.
    ///
    /// Returns the next attempt number to schedule, or `None` once the
    /// budget is spent (the supervisor moves to [`ReconnectState::Failed`]).
    pub fn on_attempt_failed(&mut self) -> Option<u32> {
        match self.state {
            ReconnectState::Reconnecting { attempt }
                if attempt < self.config.max_attempts =>
            {
                let next = attempt + 1;
                self.state = ReconnectState::Reconnecting { attempt: next };
                debug!(attempt = next, max = self.config.max_attempts, "retrying");
                Some(next)
            }
            ReconnectState::Reconnecting { attempt } => {
                warn!(attempts = attempt, "reconnection budget exhausted");
                self.state = ReconnectState::Failed;
                None
            }
            ReconnectState::Stable | ReconnectState::Failed => None,
        }
    }

    /// Records a successful connect. Resets the budget for the next
    /// outage.
    pub fn on_attempt_succeeded(&mut self) {
        if let ReconnectState::Reconnecting { attempt } = self.state {
            debug!(attempt, "reconnected");
        }
        self.state = ReconnectState::Stable;
    }
}

// =========================================================================
// Tests
// =========================================================================
