//! Core identity and domain types shared across the lobby protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier for one connected client.
///
/// Assigned by the transport once the connection reaches `connected`;
/// stable for the lifetime of that connection and unique within a lobby.
/// A client that reconnects gets a *new* id — presence is per-connection,
/// not per-person.
///
/// `#[serde(transparent)]` keeps the wire form a plain JSON string, which
/// is what the relay's `id`/`playerId` fields carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wraps a raw connection identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A human-shareable lobby code (e.g. `"AB12CD"`).
///
/// Normalized to uppercase on construction and immutable afterwards.
/// The pub/sub channel for a lobby is named `lobby:<code>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Creates a lobby code, uppercasing the input.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pub/sub channel name for this lobby.
    pub fn channel_name(&self) -> String {
        format!("lobby:{}", self.0)
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// One exclusive seat in the trial.
///
/// The set is closed: anything outside it is rejected at the decode
/// boundary. At most one participant holds a given role at any time —
/// that invariant is owned by the role arbitration layer, not here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoleId {
    Judge,
    Prosecutor,
    Defense,
    Witness,
    Jury,
    Spectator,
}

impl RoleId {
    /// Every role, in seating order.
    pub const ALL: [RoleId; 6] = [
        RoleId::Judge,
        RoleId::Prosecutor,
        RoleId::Defense,
        RoleId::Witness,
        RoleId::Jury,
        RoleId::Spectator,
    ];

    /// The wire identifier (`"judge"`, `"prosecutor"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::Judge => "judge",
            RoleId::Prosecutor => "prosecutor",
            RoleId::Defense => "defense",
            RoleId::Witness => "witness",
            RoleId::Jury => "jury",
            RoleId::Spectator => "spectator",
        }
    }

    /// Human-readable name shown in rosters and notices.
    pub fn display_name(&self) -> &'static str {
        match self {
            RoleId::Judge => "Judge",
            RoleId::Prosecutor => "Prosecutor",
            RoleId::Defense => "Defense Attorney",
            RoleId::Witness => "Witness",
            RoleId::Jury => "Jury",
            RoleId::Spectator => "Spectator",
        }
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleId::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("unknown role \"{s}\""))
            })
    }
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

/// The branch of law a case belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseKind {
    Criminal,
    Civil,
}

/// A reference to one case from the content catalogue.
///
/// The lobby only coordinates *which* case was picked; the case body
/// itself lives behind the HTTP content APIs and never crosses the
/// pub/sub channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRef {
    /// Criminal or civil docket.
    #[serde(rename = "type")]
    pub kind: CaseKind,
    /// Index of the case within its docket.
    pub index: u32,
    /// Display title.
    pub title: String,
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle phase of a lobby session.
///
/// Strictly forward — a session never regresses while it lives:
///
/// ```text
/// Lobby → Starting → Active
/// ```
///
/// The derived `Ord` follows declaration order, which is what
/// [`Phase::can_advance_to`] relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Participants are gathering, claiming roles, picking a case.
    Lobby,
    /// The leader fired the start; clients are transitioning.
    Starting,
    /// The trial is running.
    Active,
}

impl Phase {
    /// Returns `true` if moving from `self` to `target` goes forward.
    ///
    /// Equal phases are not an advance; handlers use that to make
    /// repeated phase events idempotent.
    pub fn can_advance_to(self, target: Phase) -> bool {
        target > self
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lobby => write!(f, "lobby"),
            Phase::Starting => write!(f, "starting"),
            Phase::Active => write!(f, "active"),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
