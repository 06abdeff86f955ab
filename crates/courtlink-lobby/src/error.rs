//! Error types for the lobby layer.
//!
//! Every error here stays on the local side: a failed intent is reported
//! to the caller and nothing about it crosses the channel. Remote clients
//! only ever learn about *successful* actions.

use courtlink_protocol::ProtocolError;
use courtlink_state::StateError;
use courtlink_transport::TransportError;

/// Errors surfaced by the lobby coordinator and its handle.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The transport failed (connect, publish, or channel loss).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An outgoing event failed to serialize.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A local intent was rejected (role held, not the leader, no case
    /// selected, phase closed).
    #[error(transparent)]
    State(#[from] StateError),

    /// The coordinator task is gone — the lobby was disconnected or
    /// reconnection gave up.
    #[error("not connected to a lobby")]
    NotConnected,
}
