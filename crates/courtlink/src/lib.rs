//! # Courtlink
//!
//! Serverless lobby coordination for browser courtroom sessions.
//!
//! Courtlink lets 2–6 clients converge — with no central authority — on
//! who is present, which client holds each exclusive trial role, which
//! case was selected, and when the session leaves the lobby. All
//! coordination happens over a best-effort pub/sub channel: clients
//! broadcast their own actions, apply everyone's (their own included)
//! through idempotent handlers, and heal divergence with leader
//! snapshots instead of locks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use courtlink::prelude::*;
//!
//! # async fn run() -> Result<(), CourtlinkError> {
//! let connector = WebSocketConnector::new("wss://relay.example/ws");
//! let (lobby, mut updates) = Lobby::connect(
//!     connector,
//!     LobbyCode::new("AB12CD"),
//!     "Alice",
//!     true, // lobby creator is the leader
//!     LobbyConfig::default(),
//! )
//! .await?;
//!
//! lobby.claim_role(RoleId::Judge).await?;
//! while let Some(update) = updates.recv().await {
//!     tracing::info!(?update, "lobby changed");
//! }
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::CourtlinkError;

pub use courtlink_liveness::{HeartbeatScheduler, LivenessConfig};
pub use courtlink_lobby::{
    Lobby, LobbyConfig, LobbyError, LobbyHandle, LobbyUpdate, ReconnectConfig,
    ReconnectState, ReconnectSupervisor,
};
pub use courtlink_protocol::{
    CaseKind, CaseRef, ClientId, Codec, JsonCodec, LobbyCode, LobbyEvent, Phase,
    ProtocolError, RoleId,
};
pub use courtlink_state::{
    LobbySnapshot, LobbyStore, Participant, StateError,
};
pub use courtlink_transport::{
    Channel, ChannelMessage, Connector, MemoryHub, TransportError,
};
#[cfg(feature = "websocket")]
pub use courtlink_transport::WebSocketConnector;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        CaseKind, CaseRef, ClientId, Connector, CourtlinkError, LivenessConfig,
        Lobby, LobbyCode, LobbyConfig, LobbyHandle, LobbySnapshot, LobbyUpdate,
        Phase, ReconnectConfig, RoleId,
    };
    #[cfg(feature = "websocket")]
    pub use crate::WebSocketConnector;
}

/// Installs a `tracing` subscriber reading `RUST_LOG`, defaulting to
/// `courtlink=info`.
///
/// Call once at startup; later calls are no-ops so tests can call it
/// freely.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courtlink=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
