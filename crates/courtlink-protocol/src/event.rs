//! The closed lobby event catalogue.
//!
//! Each event travels on the channel as an `(event name, payload)` pair:
//! the name is a kebab-case string, the payload a flat JSON object with
//! camelCase fields (the relay's existing conventions). [`LobbyEvent`]
//! is the tagged union over that catalogue; [`LobbyEvent::decode`] is the
//! single place where raw bytes become trusted data.
//!
//! Unknown fields are rejected along with unknown event names — a payload
//! that doesn't match its name's schema is dropped at the boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CaseRef, ClientId, Codec, Phase, ProtocolError, RoleId};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A participant announced itself on the channel.
///
/// Published on first join and on every rejoin after a reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlayerJoined {
    pub id: ClientId,
    pub name: String,
    pub is_leader: bool,
    pub timestamp: u64,
}

/// A participant left deliberately (explicit disconnect, not a timeout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlayerLeft {
    pub id: ClientId,
    pub timestamp: u64,
}

/// A participant claimed an exclusive role.
///
/// `role_name` duplicates the display name so UIs can render the notice
/// without a lookup; `role_id` is the authoritative field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleClaimed {
    pub player_id: ClientId,
    pub player_name: String,
    pub role_id: RoleId,
    pub role_name: String,
}

/// The leader selected a case for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseSelected {
    pub case: CaseRef,
}

/// The leader started the trial. Fire-and-forget broadcast; every client
/// transitions itself on receipt (there is no distributed commit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrialStart {
    pub case: CaseRef,
    pub roles: BTreeMap<RoleId, ClientId>,
    pub timestamp: u64,
}

/// Periodic liveness beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Heartbeat {
    pub player_id: ClientId,
    pub timestamp: u64,
}

/// Leader-published session snapshot.
///
/// Re-broadcast whenever the leader observes a `player-joined`, so a
/// client that missed `case-selected` or `trial-start` (transport hiccup,
/// rejoin after reconnect) converges instead of sitting in the lobby
/// phase forever. Application is idempotent: phase only advances, roles
/// apply remote-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StateSync {
    pub phase: Phase,
    pub case: Option<CaseRef>,
    pub roles: BTreeMap<RoleId, ClientId>,
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// LobbyEvent
// ---------------------------------------------------------------------------

/// Every message that crosses a lobby channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    RoleClaimed(RoleClaimed),
    CaseSelected(CaseSelected),
    TrialStart(TrialStart),
    Heartbeat(Heartbeat),
    StateSync(StateSync),
}

impl LobbyEvent {
    /// Channel event name for `player-joined`.
    pub const PLAYER_JOINED: &'static str = "player-joined";
    /// Channel event name for `player-left`.
    pub const PLAYER_LEFT: &'static str = "player-left";
    /// Channel event name for `role-claimed`.
    pub const ROLE_CLAIMED: &'static str = "role-claimed";
    /// Channel event name for `case-selected`.
    pub const CASE_SELECTED: &'static str = "case-selected";
    /// Channel event name for `trial-start`.
    pub const TRIAL_START: &'static str = "trial-start";
    /// Channel event name for `heartbeat`.
    pub const HEARTBEAT: &'static str = "heartbeat";
    /// Channel event name for `state-sync`.
    pub const STATE_SYNC: &'static str = "state-sync";

    /// The channel event name this variant travels under.
    pub fn name(&self) -> &'static str {
        match self {
            LobbyEvent::PlayerJoined(_) => Self::PLAYER_JOINED,
            LobbyEvent::PlayerLeft(_) => Self::PLAYER_LEFT,
            LobbyEvent::RoleClaimed(_) => Self::ROLE_CLAIMED,
            LobbyEvent::CaseSelected(_) => Self::CASE_SELECTED,
            LobbyEvent::TrialStart(_) => Self::TRIAL_START,
            LobbyEvent::Heartbeat(_) => Self::HEARTBEAT,
            LobbyEvent::StateSync(_) => Self::STATE_SYNC,
        }
    }

    /// Serializes this event into its `(name, payload)` wire form.
    pub fn encode<C: Codec>(
        &self,
        codec: &C,
    ) -> Result<(&'static str, Vec<u8>), ProtocolError> {
        let bytes = match self {
            LobbyEvent::PlayerJoined(p) => codec.encode(p)?,
            LobbyEvent::PlayerLeft(p) => codec.encode(p)?,
            LobbyEvent::RoleClaimed(p) => codec.encode(p)?,
            LobbyEvent::CaseSelected(p) => codec.encode(p)?,
            LobbyEvent::TrialStart(p) => codec.encode(p)?,
            LobbyEvent::Heartbeat(p) => codec.encode(p)?,
            LobbyEvent::StateSync(p) => codec.encode(p)?,
        };
        Ok((self.name(), bytes))
    }

    /// Decodes and validates an incoming `(name, payload)` pair.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownEvent`] — name outside the catalogue
    /// - [`ProtocolError::Decode`] — payload doesn't match the name's schema
    pub fn decode<C: Codec>(
        codec: &C,
        name: &str,
        data: &[u8],
    ) -> Result<Self, ProtocolError> {
        match name {
            Self::PLAYER_JOINED => Ok(LobbyEvent::PlayerJoined(codec.decode(data)?)),
            Self::PLAYER_LEFT => Ok(LobbyEvent::PlayerLeft(codec.decode(data)?)),
            Self::ROLE_CLAIMED => Ok(LobbyEvent::RoleClaimed(codec.decode(data)?)),
            Self::CASE_SELECTED => Ok(LobbyEvent::CaseSelected(codec.decode(data)?)),
            Self::TRIAL_START => Ok(LobbyEvent::TrialStart(codec.decode(data)?)),
            Self::HEARTBEAT => Ok(LobbyEvent::Heartbeat(codec.decode(data)?)),
            Self::STATE_SYNC => Ok(LobbyEvent::StateSync(codec.decode(data)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The relay's JSON shapes are load-bearing: browser clients already
    //! speak them. These tests pin the exact field names and the
    //! reject-at-boundary behavior.

    use super::*;
    use crate::{CaseKind, JsonCodec};

    fn cid(s: &str) -> ClientId {
        ClientId::new(s)
    }

    fn sample_case() -> CaseRef {
        CaseRef {
            kind: CaseKind::Civil,
            index: 1,
            title: "Harlan v. Ostrander".into(),
        }
    }

    #[test]
    fn test_player_joined_wire_shape() {
        let event = PlayerJoined {
            id: cid("c1"),
            name: "Alice".into(),
            is_leader: true,
            timestamp: 1_000,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], "c1");
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["isLeader"], true);
        assert_eq!(json["timestamp"], 1_000);
    }

    #[test]
    fn test_role_claimed_wire_shape() {
        let event = RoleClaimed {
            player_id: cid("c2"),
            player_name: "Bob".into(),
            role_id: RoleId::Prosecutor,
            role_name: RoleId::Prosecutor.display_name().into(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["playerId"], "c2");
        assert_eq!(json["playerName"], "Bob");
        assert_eq!(json["roleId"], "prosecutor");
        assert_eq!(json["roleName"], "Prosecutor");
    }

    #[test]
    fn test_heartbeat_wire_shape() {
        let event = Heartbeat {
            player_id: cid("c3"),
            timestamp: 42,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["playerId"], "c3");
        assert_eq!(json["timestamp"], 42);
    }

    #[test]
    fn test_trial_start_roles_keyed_by_role_id() {
        let mut roles = BTreeMap::new();
        roles.insert(RoleId::Judge, cid("c1"));
        roles.insert(RoleId::Defense, cid("c2"));
        let event = TrialStart {
            case: sample_case(),
            roles,
            timestamp: 7,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["roles"]["judge"], "c1");
        assert_eq!(json["roles"]["defense"], "c2");
        assert_eq!(json["case"]["type"], "civil");
    }

    #[test]
    fn test_encode_decode_round_trip_every_variant() {
        let codec = JsonCodec::new();
        let mut roles = BTreeMap::new();
        roles.insert(RoleId::Jury, cid("c9"));

        let events = vec![
            LobbyEvent::PlayerJoined(PlayerJoined {
                id: cid("c1"),
                name: "Alice".into(),
                is_leader: true,
                timestamp: 1,
            }),
            LobbyEvent::PlayerLeft(PlayerLeft {
                id: cid("c1"),
                timestamp: 2,
            }),
            LobbyEvent::RoleClaimed(RoleClaimed {
                player_id: cid("c2"),
                player_name: "Bob".into(),
                role_id: RoleId::Witness,
                role_name: "Witness".into(),
            }),
            LobbyEvent::CaseSelected(CaseSelected {
                case: sample_case(),
            }),
            LobbyEvent::TrialStart(TrialStart {
                case: sample_case(),
                roles: roles.clone(),
                timestamp: 3,
            }),
            LobbyEvent::Heartbeat(Heartbeat {
                player_id: cid("c2"),
                timestamp: 4,
            }),
            LobbyEvent::StateSync(StateSync {
                phase: Phase::Active,
                case: Some(sample_case()),
                roles,
                timestamp: 5,
            }),
        ];

        for event in events {
            let (name, bytes) = event.encode(&codec).unwrap();
            let decoded = LobbyEvent::decode(&codec, name, &bytes).unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn test_decode_unknown_event_name_is_rejected() {
        let codec = JsonCodec::new();
        let result = LobbyEvent::decode(&codec, "judge-bribed", b"{}");
        assert!(matches!(result, Err(ProtocolError::UnknownEvent(_))));
    }

    #[test]
    fn test_decode_mismatched_payload_is_rejected() {
        // A heartbeat payload under the player-joined name must fail:
        // handlers never guess at shapes.
        let codec = JsonCodec::new();
        let heartbeat = serde_json::to_vec(&Heartbeat {
            player_id: cid("c1"),
            timestamp: 1,
        })
        .unwrap();
        let result =
            LobbyEvent::decode(&codec, LobbyEvent::PLAYER_JOINED, &heartbeat);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_extra_fields_are_rejected() {
        let codec = JsonCodec::new();
        let padded = br#"{"playerId":"c1","timestamp":1,"debug":true}"#;
        let result = LobbyEvent::decode(&codec, LobbyEvent::HEARTBEAT, padded);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_garbage_is_rejected() {
        let codec = JsonCodec::new();
        let result =
            LobbyEvent::decode(&codec, LobbyEvent::HEARTBEAT, b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_state_sync_without_case_round_trips() {
        let codec = JsonCodec::new();
        let event = LobbyEvent::StateSync(StateSync {
            phase: Phase::Lobby,
            case: None,
            roles: BTreeMap::new(),
            timestamp: 0,
        });
        let (name, bytes) = event.encode(&codec).unwrap();
        assert_eq!(name, "state-sync");
        let decoded = LobbyEvent::decode(&codec, name, &bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
