//! Unified error type for the Courtlink stack.

use courtlink_lobby::LobbyError;
use courtlink_protocol::ProtocolError;
use courtlink_state::StateError;
use courtlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `courtlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CourtlinkError {
    /// A transport-level error (connect, publish, channel loss).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown event).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A state-level error (role held, not the leader, no case).
    #[error(transparent)]
    State(#[from] StateError),

    /// A lobby-level error (coordinator gone, reconnect exhausted).
    #[error(transparent)]
    Lobby(#[from] LobbyError),
}
