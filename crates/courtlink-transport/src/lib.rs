//! Pub/sub transport abstraction for Courtlink.
//!
//! The lobby core never talks to a socket directly — it consumes the
//! [`Connector`] and [`Channel`] traits. A channel is a named broadcast
//! topic (`lobby:<code>`): everything published on it is delivered to
//! every subscriber, the publisher included. Delivery is best-effort and
//! FIFO per channel; no cross-channel ordering is assumed.
//!
//! Two implementations ship here:
//! - [`MemoryHub`] — in-process broker for tests and local play
//! - [`WebSocketConnector`] — relay adapter via `tokio-tungstenite`
//!   (feature `websocket`, default)
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket relay adapter

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryChannel, MemoryHub};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector};

use std::future::Future;

use courtlink_protocol::ClientId;

/// One message delivered on a channel: a named event plus its raw payload.
///
/// Payload bytes are opaque here; the protocol layer decodes and
/// validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// The event name (`"player-joined"`, `"heartbeat"`, ...).
    pub event: String,
    /// The serialized payload.
    pub data: Vec<u8>,
}

/// Opens connections to named channels.
///
/// `connect` resolves once the underlying connection reaches its
/// `connected` state, and errors on failure or timeout. Each successful
/// connect yields a fresh [`Channel`] with its own [`ClientId`] — a
/// reconnecting client is a new participant as far as the transport is
/// concerned.
///
/// The methods are spelled out as `impl Future + Send` rather than
/// `async fn` because the lobby coordinator runs on a spawned task;
/// implementations can still use plain `async fn`.
pub trait Connector: Send + Sync + 'static {
    /// The channel type produced by this connector.
    type Channel: Channel;

    /// Connects and subscribes to the named channel.
    fn connect(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A live subscription to one named channel.
pub trait Channel: Send + Sync + 'static {
    /// Publishes an event to every subscriber of this channel
    /// (including this one — publishes loop back).
    fn publish(
        &self,
        event: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message, in delivery order.
    ///
    /// Returns `None` when the connection is lost or closed; the caller
    /// decides whether that means reconnect or teardown.
    fn recv(&mut self) -> impl Future<Output = Option<ChannelMessage>> + Send;

    /// The stable per-connection identifier assigned at connect time.
    fn client_id(&self) -> &ClientId;

    /// Closes the subscription. Further `recv` calls return `None`.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
