//! Lobby coordination for Courtlink.
//!
//! This crate ties the layers together: one [`Lobby::connect`] call
//! opens the pub/sub channel, announces the local participant, and
//! spawns a coordinator task that owns the lobby state for as long as
//! the session lives. Consumers drive it through [`LobbyHandle`] and
//! react to [`LobbyUpdate`]s.
//!
//! There is no central authority anywhere in here: every client runs
//! the same coordinator over the same broadcast events and converges on
//! who is present, who holds which role, which case was picked, and
//! when the trial starts.

mod config;
mod coordinator;
mod error;
mod supervisor;

pub use config::LobbyConfig;
pub use coordinator::{Lobby, LobbyHandle, LobbyUpdate};
pub use error::LobbyError;
pub use supervisor::{ReconnectConfig, ReconnectState, ReconnectSupervisor};
