//! The composed lobby store.
//!
//! [`LobbyStore`] owns the presence ledger, the role arbiter, and the
//! session state, and is the only place that mutates more than one of
//! them in a single step. That is what keeps the cross-store invariants
//! honest: a participant that leaves or goes stale has its role freed in
//! the same call, and the cached role on each roster entry always
//! mirrors the arbiter.
//!
//! Methods split into two families, matching the protocol's conflict
//! rules:
//!
//! - `claim_role` / `select_case` / `start_trial` validate a **local
//!   intent** and return the event payload to broadcast, or an error
//!   that stays local. They do not mutate: the state changes when the
//!   published event echoes back, so an intent whose broadcast never
//!   went out leaves no trace and can simply be retried.
//! - `apply_*` ingest an **incoming event** (remote or the loopback echo
//!   of our own publish) and never fail: stale, duplicate, and reordered
//!   messages degrade to no-ops.

use std::collections::BTreeMap;

use courtlink_protocol::{
    CaseRef, CaseSelected, ClientId, Heartbeat, LobbyCode, Phase, PlayerJoined,
    PlayerLeft, RoleClaimed, RoleId, StateSync, TrialStart,
};
use serde::Serialize;

use crate::{Participant, PresenceLedger, RemoteClaim, RoleArbiter, SessionState, StateError};

/// A participant removed by the liveness sweep or an explicit leave,
/// together with the role it freed (at most one — seats are exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct Evicted {
    pub participant: Participant,
    pub freed_role: Option<RoleId>,
}

/// A read-only copy of everything the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub code: LobbyCode,
    pub local_id: ClientId,
    pub is_leader: bool,
    pub phase: Phase,
    pub case: Option<CaseRef>,
    /// Sorted by id so repeated snapshots render stably.
    pub participants: Vec<Participant>,
    pub roles: BTreeMap<RoleId, ClientId>,
}

/// All lobby state for one client, mutated only by its coordinator task.
#[derive(Debug)]
pub struct LobbyStore {
    roster: PresenceLedger,
    roles: RoleArbiter,
    session: SessionState,
    local_name: String,
}

impl LobbyStore {
    /// Creates a store seeded with the local participant.
    pub fn new(
        code: LobbyCode,
        local_id: ClientId,
        local_name: impl Into<String>,
        is_leader: bool,
        now: u64,
    ) -> Self {
        let local_name = local_name.into();
        let roster = PresenceLedger::new(Participant {
            id: local_id,
            name: local_name.clone(),
            is_leader,
            role: None,
            last_seen_at: now,
        });
        Self {
            roster,
            roles: RoleArbiter::new(),
            session: SessionState::new(code, is_leader),
            local_name,
        }
    }

    pub fn local_id(&self) -> &ClientId {
        self.roster.local_id()
    }

    pub fn is_leader(&self) -> bool {
        self.session.is_leader()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Who currently holds `role`, if anyone.
    pub fn role_holder(&self, role: RoleId) -> Option<&ClientId> {
        self.roles.holder_of(role)
    }

    // ---------------------------------------------------------------------
    // Outbound announcements (no validation needed)
    // ---------------------------------------------------------------------

    /// The join announcement for the local participant.
    pub fn join_announcement(&self, timestamp: u64) -> PlayerJoined {
        PlayerJoined {
            id: self.roster.local_id().clone(),
            name: self.local_name.clone(),
            is_leader: self.session.is_leader(),
            timestamp,
        }
    }

    /// The explicit-leave announcement for the local participant.
    pub fn leave_announcement(&self, timestamp: u64) -> PlayerLeft {
        PlayerLeft {
            id: self.roster.local_id().clone(),
            timestamp,
        }
    }

    /// The periodic liveness beacon for the local participant.
    pub fn heartbeat(&self, timestamp: u64) -> Heartbeat {
        Heartbeat {
            player_id: self.roster.local_id().clone(),
            timestamp,
        }
    }

    /// The leader's session snapshot for late or lossy joiners.
    pub fn sync_announcement(&self, timestamp: u64) -> StateSync {
        StateSync {
            phase: self.session.phase(),
            case: self.session.case().cloned(),
            roles: self.roles.assignments(),
            timestamp,
        }
    }

    // ---------------------------------------------------------------------
    // Local intents
    // ---------------------------------------------------------------------

    /// Validates a role claim for the local participant,
    /// first-claim-wins, and returns the `role-claimed` payload to
    /// broadcast. The assignment lands via the loopback echo.
    ///
    /// # Errors
    /// [`StateError::RoleHeld`] if the seat is taken,
    /// [`StateError::PhaseClosed`] once role selection has ended.
    pub fn claim_role(&self, role: RoleId) -> Result<RoleClaimed, StateError> {
        if self.session.phase() != Phase::Lobby {
            return Err(StateError::PhaseClosed);
        }
        let local_id = self.roster.local_id();
        self.roles.ensure_claimable(local_id, role)?;
        Ok(RoleClaimed {
            player_id: local_id.clone(),
            player_name: self.local_name.clone(),
            role_id: role,
            role_name: role.display_name().into(),
        })
    }

    /// Validates a case selection (leader-only, lobby-phase-only) and
    /// returns the `case-selected` payload to broadcast. The selection
    /// lands via the loopback echo.
    ///
    /// # Errors
    /// See [`SessionState::authorize_case_selection`].
    pub fn select_case(&self, case: CaseRef) -> Result<CaseSelected, StateError> {
        self.session.authorize_case_selection()?;
        Ok(CaseSelected { case })
    }

    /// Validates a trial start and returns the `trial-start` payload
    /// carrying the case and the full role map.
    ///
    /// The phase is untouched here: the coordinator calls
    /// [`LobbyStore::mark_starting`] once the broadcast actually went
    /// out, so a failed publish leaves the session open for a retry.
    ///
    /// # Errors
    /// See [`SessionState::authorize_start`].
    pub fn start_trial(&self, timestamp: u64) -> Result<TrialStart, StateError> {
        let case = self.session.authorize_start()?;
        Ok(TrialStart {
            case,
            roles: self.roles.assignments(),
            timestamp,
        })
    }

    /// Moves the session into the starting phase after a successful
    /// `trial-start` broadcast. The loopback echo completes the
    /// transition to `active`.
    pub fn mark_starting(&mut self) -> bool {
        self.session.apply_phase(Phase::Starting)
    }

    // ---------------------------------------------------------------------
    // Incoming events
    // ---------------------------------------------------------------------

    /// Applies a `player-joined` event. Returns `true` if the roster
    /// actually grew (duplicates and our own echo only refresh liveness).
    ///
    /// `now` is the local receipt time; the sender's clock is never used
    /// for liveness.
    pub fn apply_join(&mut self, event: &PlayerJoined, now: u64) -> bool {
        let inserted =
            self.roster
                .record_join(event.id.clone(), event.name.clone(), event.is_leader, now);
        if inserted {
            tracing::info!(participant = %event.id, name = %event.name, "participant joined");
        }
        inserted
    }

    /// Applies a `player-left` event: the participant goes immediately,
    /// its role is freed in the same step.
    pub fn apply_leave(&mut self, event: &PlayerLeft) -> Option<Evicted> {
        if &event.id == self.roster.local_id() {
            // Our own leave echo; teardown is already underway.
            return None;
        }
        let participant = self.roster.record_leave(&event.id)?;
        let freed_role = self.roles.release_all(&event.id).into_iter().next();
        tracing::info!(participant = %event.id, "participant left");
        Some(Evicted {
            participant,
            freed_role,
        })
    }

    /// Applies a heartbeat at local receipt time `now`.
    pub fn apply_heartbeat(&mut self, event: &Heartbeat, now: u64) {
        self.roster.record_heartbeat(&event.player_id, now);
    }

    /// Applies a `role-claimed` event, remote-wins.
    ///
    /// If the displaced holder is the local participant, the caller
    /// surfaces that to the UI; the lost claim is never re-asserted.
    pub fn apply_role_claim(&mut self, event: &RoleClaimed) -> RemoteClaim {
        let outcome = self.roles.apply_remote(&event.player_id, event.role_id);
        if let Some(displaced) = &outcome.displaced {
            self.roster.set_role(displaced, None);
        }
        self.roster.set_role(&event.player_id, Some(event.role_id));
        outcome
    }

    /// Applies a `case-selected` event. Returns `true` if the case
    /// changed.
    pub fn apply_case(&mut self, event: &CaseSelected) -> bool {
        self.session.apply_case(event.case.clone())
    }

    /// Applies a `trial-start` event: the embedded role map and case are
    /// authoritative, and the phase advances to `active`.
    ///
    /// Returns `true` if the phase advanced (the duplicate-delivery case
    /// returns `false` and changes nothing further).
    pub fn apply_trial_start(&mut self, event: &TrialStart) -> bool {
        if !self.session.apply_phase(Phase::Active) {
            return false;
        }
        self.session.apply_case(event.case.clone());
        self.roles.apply_snapshot(&event.roles);
        self.refresh_cached_roles();
        true
    }

    /// Applies a leader `state-sync` snapshot: phase forward-only, case
    /// remote-wins, roles merged per entry. Returns `true` if anything
    /// changed.
    ///
    /// The role merge is additive: entries the snapshot carries are
    /// applied remote-wins, entries it lacks are left alone. The
    /// snapshot may have been taken before the leader saw a claim this
    /// client already holds confirmed, so an absent entry is not
    /// evidence the seat is vacant — seats are only vacated by the
    /// leave, eviction, or switch that actually freed them.
    pub fn apply_state_sync(&mut self, event: &StateSync) -> bool {
        let mut changed = self.session.apply_phase(event.phase);
        if let Some(case) = &event.case {
            changed |= self.session.apply_case(case.clone());
        }
        let mut roles_changed = false;
        for (role, holder) in &event.roles {
            if self.roles.holder_of(*role) == Some(holder) {
                continue;
            }
            self.roles.apply_remote(holder, *role);
            roles_changed = true;
        }
        if roles_changed {
            self.refresh_cached_roles();
            changed = true;
        }
        changed
    }

    /// Evicts participants not heard from within `timeout_ms`, freeing
    /// their roles in the same step.
    pub fn sweep_stale(&mut self, now: u64, timeout_ms: u64) -> Vec<Evicted> {
        self.roster
            .sweep_stale(now, timeout_ms)
            .into_iter()
            .map(|participant| {
                let freed_role =
                    self.roles.release_all(&participant.id).into_iter().next();
                Evicted {
                    participant,
                    freed_role,
                }
            })
            .collect()
    }

    /// A copy of everything the UI renders.
    pub fn snapshot(&self) -> LobbySnapshot {
        let mut participants: Vec<Participant> = self.roster.iter().cloned().collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));
        LobbySnapshot {
            code: self.session.code().clone(),
            local_id: self.roster.local_id().clone(),
            is_leader: self.session.is_leader(),
            phase: self.session.phase(),
            case: self.session.case().cloned(),
            participants,
            roles: self.roles.assignments(),
        }
    }

    fn refresh_cached_roles(&mut self) {
        let roles = &self.roles;
        self.roster.refresh_roles(|id| roles.role_of(id));
    }
}

// =========================================================================
// Tests
// =========================================================================
