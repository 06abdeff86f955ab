//! Local lobby state for Courtlink.
//!
//! Three stores, one owner: the [`PresenceLedger`] (who is here, how
//! recently they were seen), the [`RoleArbiter`] (which participant holds
//! each exclusive seat), and the [`SessionState`] (lobby code, phase,
//! selected case). [`LobbyStore`] composes them so cross-store invariants
//! — an evicted participant never "keeps" a role, a role switch never
//! leaves someone holding two seats — hold across every mutation.
//!
//! # Concurrency note
//!
//! Nothing here is thread-safe, and that's intentional: the store is
//! owned by a single coordinator task and mutated only on its event loop.
//! Cross-client races are resolved by the conflict rules (first-claim-wins
//! locally, remote-wins on incoming events), not by locks.

mod error;
mod roles;
mod roster;
mod session;
mod store;

pub use error::StateError;
pub use roles::{RemoteClaim, RoleArbiter};
pub use roster::{Participant, PresenceLedger};
pub use session::SessionState;
pub use store::{Evicted, LobbySnapshot, LobbyStore};
