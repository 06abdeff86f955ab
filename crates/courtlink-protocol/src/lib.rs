//! Wire protocol for Courtlink lobbies.
//!
//! Everything that travels over the pub/sub channel is defined here:
//! identity newtypes, the fixed role set, the case reference, and the
//! closed [`LobbyEvent`] catalogue. Payload shapes match the relay's
//! existing JSON conventions (camelCase fields, kebab-case event names),
//! and decoding validates at the boundary — an unknown event name or a
//! malformed payload is an error, never a guess.

mod codec;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{
    CaseSelected, Heartbeat, LobbyEvent, PlayerJoined, PlayerLeft,
    RoleClaimed, StateSync, TrialStart,
};
pub use types::{CaseKind, CaseRef, ClientId, LobbyCode, Phase, RoleId};
