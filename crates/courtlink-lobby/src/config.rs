//! Lobby coordinator configuration.

use courtlink_liveness::LivenessConfig;

use crate::ReconnectConfig;

/// Full configuration for one lobby connection.
///
/// The defaults match the deployed browser clients: 5 s heartbeats, a
/// 15 s staleness window, and three reconnect attempts 3 s apart.
#[derive(Debug, Clone, Default)]
pub struct LobbyConfig {
    /// Heartbeat cadence and staleness policy.
    pub liveness: LivenessConfig,
    /// Reconnection attempt budget and pacing.
    pub reconnect: ReconnectConfig,
}
