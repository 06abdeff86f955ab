//! The presence ledger: who is in the lobby and how recently we heard
//! from them.
//!
//! Presence is per-connection and liveness-based — a participant is
//! "here" because heartbeats keep arriving, not because anyone holds a
//! canonical member list. Every operation degrades to a no-op on a
//! missing key: presence messages are inherently racy (a leave and a
//! stale-sweep can both target the same id), so none of these can fail.

use std::collections::HashMap;

use courtlink_protocol::{ClientId, RoleId};
use serde::Serialize;

/// One participant as this client currently sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Connection identifier (changes on reconnect).
    pub id: ClientId,
    /// Display name.
    pub name: String,
    /// Fixed at join time; the leader is never re-elected.
    pub is_leader: bool,
    /// The exclusive seat this participant holds, if any.
    pub role: Option<RoleId>,
    /// Milliseconds timestamp of the last join/heartbeat we received.
    pub last_seen_at: u64,
}

/// In-memory roster with liveness timestamps.
///
/// The local participant is pinned: it is inserted at construction and
/// [`PresenceLedger::sweep_stale`] never evicts it — the local client's
/// own liveness is the reconnection supervisor's problem, not the
/// sweep's.
#[derive(Debug)]
pub struct PresenceLedger {
    local_id: ClientId,
    participants: HashMap<ClientId, Participant>,
}

impl PresenceLedger {
    /// Creates a ledger seeded with the local participant.
    pub fn new(local: Participant) -> Self {
        let local_id = local.id.clone();
        let mut participants = HashMap::new();
        participants.insert(local_id.clone(), local);
        Self {
            local_id,
            participants,
        }
    }

    /// The local participant's connection id.
    pub fn local_id(&self) -> &ClientId {
        &self.local_id
    }

    /// Records a join. Returns `true` if the participant was inserted.
    ///
    /// Insertion is idempotent: a duplicate join for an existing id only
    /// refreshes `last_seen_at` — it never appends a second entry and
    /// never resets the leader flag or role.
    pub fn record_join(
        &mut self,
        id: ClientId,
        name: String,
        is_leader: bool,
        now: u64,
    ) -> bool {
        if let Some(existing) = self.participants.get_mut(&id) {
            existing.last_seen_at = now;
            return false;
        }
        self.participants.insert(
            id.clone(),
            Participant {
                id,
                name,
                is_leader,
                role: None,
                last_seen_at: now,
            },
        );
        true
    }

    /// Refreshes `last_seen_at` for a participant.
    ///
    /// Late heartbeats for an already-evicted id are silently dropped.
    pub fn record_heartbeat(&mut self, id: &ClientId, now: u64) {
        if let Some(p) = self.participants.get_mut(id) {
            p.last_seen_at = now;
        }
    }

    /// Removes a participant immediately (explicit leave, no timeout).
    ///
    /// Returns the removed entry so the caller can release its role in
    /// the same step; `None` if the id was already gone.
    pub fn record_leave(&mut self, id: &ClientId) -> Option<Participant> {
        self.participants.remove(id)
    }

    /// Evicts every non-local participant not seen within `timeout_ms`.
    ///
    /// Returns the evicted entries. The caller must release their roles
    /// in the same logical step so the ledger and role map never show a
    /// torn state.
    pub fn sweep_stale(&mut self, now: u64, timeout_ms: u64) -> Vec<Participant> {
        let stale: Vec<ClientId> = self
            .participants
            .values()
            .filter(|p| {
                p.id != self.local_id
                    && now.saturating_sub(p.last_seen_at) > timeout_ms
            })
            .map(|p| p.id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                let removed = self.participants.remove(&id);
                if let Some(p) = &removed {
                    tracing::debug!(
                        participant = %p.id,
                        name = %p.name,
                        "evicting stale participant"
                    );
                }
                removed
            })
            .collect()
    }

    /// Sets or clears the cached role of a participant. No-op if absent.
    pub fn set_role(&mut self, id: &ClientId, role: Option<RoleId>) {
        if let Some(p) = self.participants.get_mut(id) {
            p.role = role;
        }
    }

    /// Recomputes every participant's cached role from an authoritative
    /// lookup (used after bulk role changes like a snapshot).
    pub fn refresh_roles(&mut self, role_of: impl Fn(&ClientId) -> Option<RoleId>) {
        for p in self.participants.values_mut() {
            p.role = role_of(&p.id);
        }
    }

    /// Looks up a participant by id.
    pub fn get(&self, id: &ClientId) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Returns `true` if the id is currently present.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.participants.contains_key(id)
    }

    /// Iterates over all participants (no particular order).
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Number of participants, the local one included.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns `true` if nobody is present (cannot happen while the
    /// local participant lives, but kept for symmetry).
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
