//! Session-level state: the lobby code, the selected case, and the
//! phase machine.
//!
//! The phase only moves forward (`lobby → starting → active`). Incoming
//! phase announcements that would move it backwards or sideways are
//! stale by definition and degrade to no-ops, which makes replayed and
//! reordered messages harmless.

use courtlink_protocol::{CaseRef, LobbyCode, Phase};

use crate::StateError;

/// Lobby-wide session facts as this client currently sees them.
#[derive(Debug, Clone)]
pub struct SessionState {
    code: LobbyCode,
    is_leader: bool,
    phase: Phase,
    case: Option<CaseRef>,
}

impl SessionState {
    /// Creates a fresh session in the lobby phase with no case selected.
    pub fn new(code: LobbyCode, is_leader: bool) -> Self {
        Self {
            code,
            is_leader,
            phase: Phase::Lobby,
            case: None,
        }
    }

    /// The lobby code this session belongs to.
    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    /// Whether the local participant is the lobby leader.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The currently selected case, if any.
    pub fn case(&self) -> Option<&CaseRef> {
        self.case.as_ref()
    }

    // ---------------------------------------------------------------------
    // Local intent guards (leader-gated, mutation-free)
    // ---------------------------------------------------------------------
    //
    // Intents only validate here. The state itself changes when the
    // broadcast comes back through `apply_case`/`apply_phase`, so a
    // rejected or unpublished intent leaves nothing behind.

    /// Checks that the local participant may select a case right now.
    ///
    /// # Errors
    /// [`StateError::Forbidden`] if the local participant is not the
    /// leader, [`StateError::PhaseClosed`] once the session has left the
    /// lobby phase.
    pub fn authorize_case_selection(&self) -> Result<(), StateError> {
        if !self.is_leader {
            return Err(StateError::Forbidden);
        }
        if self.phase != Phase::Lobby {
            return Err(StateError::PhaseClosed);
        }
        Ok(())
    }

    /// Checks that the local participant may start the trial right now.
    ///
    /// Returns the case so the caller can broadcast it with the start
    /// announcement.
    ///
    /// # Errors
    /// [`StateError::Forbidden`], [`StateError::PhaseClosed`], or
    /// [`StateError::NoCaseSelected`].
    pub fn authorize_start(&self) -> Result<CaseRef, StateError> {
        self.authorize_case_selection()?;
        self.case.clone().ok_or(StateError::NoCaseSelected)
    }

    // ---------------------------------------------------------------------
    // Remote-event application (infallible, order-tolerant)
    // ---------------------------------------------------------------------

    /// Applies a remote case selection, remote-wins.
    ///
    /// Returns `true` if the case actually changed.
    pub fn apply_case(&mut self, case: CaseRef) -> bool {
        if self.case.as_ref() == Some(&case) {
            return false;
        }
        self.case = Some(case);
        true
    }

    /// Applies a phase announcement, forward-only.
    ///
    /// A duplicate or out-of-date phase is ignored and returns `false`.
    pub fn apply_phase(&mut self, phase: Phase) -> bool {
        if !self.phase.can_advance_to(phase) {
            return false;
        }
        tracing::debug!(from = %self.phase, to = %phase, "session phase advanced");
        self.phase = phase;
        true
    }
}

// =========================================================================
// Tests
// =========================================================================
