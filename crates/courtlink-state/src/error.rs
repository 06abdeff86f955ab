//! Error types for the state layer.

use courtlink_protocol::{ClientId, RoleId};

/// Errors produced by local intent validation.
///
/// These stop at the coordinator boundary and go back to the caller —
/// they are never published to the channel. Remote-event application is
/// infallible by design: stale or duplicate messages degrade to no-ops.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// A non-leader attempted a leader-only action (case selection,
    /// trial start).
    #[error("only the lobby leader may perform this action")]
    Forbidden,

    /// The role is already held by another live participant.
    /// First claim wins; the caller picks a different role.
    #[error("role {role} is already held by {holder}")]
    RoleHeld {
        /// The contested role.
        role: RoleId,
        /// Who currently holds it.
        holder: ClientId,
    },

    /// The trial cannot start before a case is selected.
    #[error("no case has been selected")]
    NoCaseSelected,

    /// The session has left the lobby phase; the operation only makes
    /// sense while gathering.
    #[error("the session is no longer in the lobby phase")]
    PhaseClosed,
}
