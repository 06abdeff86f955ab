//! Role arbitration: at most one participant per exclusive seat.
//!
//! Two rules, two directions:
//!
//! - **Local claims are first-claim-wins.** If another live participant
//!   already holds the role, the claim fails right here and nothing is
//!   broadcast. A valid claim is broadcast and takes effect through its
//!   loopback echo, the same path every other assignment takes.
//! - **Incoming events are remote-wins.** When an event says role R
//!   belongs to B, that is authoritative — even if this client believed
//!   it held R itself. The local belief is dropped and never re-asserted.
//!   Clients may transiently disagree after a genuine race over the
//!   wire; since every subsequent claim is also broadcast, applying them
//!   all remote-wins converges the map without any global lock.

use std::collections::BTreeMap;

use courtlink_protocol::{ClientId, RoleId};

use crate::StateError;

/// What an authoritative remote assignment changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteClaim {
    /// The participant that previously held the role and lost it
    /// (possibly the local participant — that is the remote-wins case).
    pub displaced: Option<ClientId>,
    /// The new holder's previous role, released in the same step.
    pub vacated: Option<RoleId>,
}

/// The role → participant partial map.
#[derive(Debug, Default)]
pub struct RoleArbiter {
    holders: BTreeMap<RoleId, ClientId>,
}

impl RoleArbiter {
    /// Creates an empty arbiter (all seats vacant).
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a local claim, first-claim-wins. Nothing is assigned
    /// here: a valid claim is broadcast and lands via [`apply_remote`]
    /// when its echo comes back, so a claim that was never published
    /// can never leave a phantom assignment behind.
    ///
    /// Re-claiming a role the claimant already holds is fine.
    ///
    /// [`apply_remote`]: RoleArbiter::apply_remote
    ///
    /// # Errors
    /// [`StateError::RoleHeld`] if another participant holds the role.
    pub fn ensure_claimable(
        &self,
        claimant: &ClientId,
        role: RoleId,
    ) -> Result<(), StateError> {
        match self.holders.get(&role) {
            Some(holder) if holder != claimant => Err(StateError::RoleHeld {
                role,
                holder: holder.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Releases every role held by `id` (leave/eviction path).
    pub fn release_all(&mut self, id: &ClientId) -> Vec<RoleId> {
        let held: Vec<RoleId> = self
            .holders
            .iter()
            .filter(|(_, holder)| *holder == id)
            .map(|(role, _)| *role)
            .collect();
        for role in &held {
            self.holders.remove(role);
        }
        held
    }

    /// Applies an authoritative remote assignment, remote-wins.
    ///
    /// Displaces whoever held the role (local participant included) and
    /// releases the new holder's previous seat.
    pub fn apply_remote(&mut self, holder: &ClientId, role: RoleId) -> RemoteClaim {
        if self.holders.get(&role) == Some(holder) {
            return RemoteClaim::default();
        }
        let vacated = self.role_of(holder);
        if let Some(prev) = vacated {
            self.holders.remove(&prev);
        }
        let displaced = self.holders.insert(role, holder.clone());
        if let Some(loser) = &displaced {
            tracing::debug!(
                %role,
                winner = %holder,
                loser = %loser,
                "remote claim displaced a holder"
            );
        }
        RemoteClaim { displaced, vacated }
    }

    /// Replaces the whole map with an authoritative snapshot.
    pub fn apply_snapshot(&mut self, roles: &BTreeMap<RoleId, ClientId>) {
        self.holders = roles.clone();
    }

    /// Who currently holds `role`, if anyone.
    pub fn holder_of(&self, role: RoleId) -> Option<&ClientId> {
        self.holders.get(&role)
    }

    /// The role `id` currently holds, if any.
    pub fn role_of(&self, id: &ClientId) -> Option<RoleId> {
        self.holders
            .iter()
            .find(|(_, holder)| *holder == id)
            .map(|(role, _)| *role)
    }

    /// A copy of the current assignments.
    pub fn assignments(&self) -> BTreeMap<RoleId, ClientId> {
        self.holders.clone()
    }

    /// Number of claimed seats.
    pub fn claimed_count(&self) -> usize {
        self.holders.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
