//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding lobby events.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed — malformed JSON, missing fields, or a
    /// payload that doesn't match the shape its event name promises.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The event name is not part of the lobby catalogue.
    ///
    /// Events are a closed set; anything else on the channel is dropped
    /// at the boundary rather than trusted.
    #[error("unknown event \"{0}\"")]
    UnknownEvent(String),

    /// The message decoded but violates a protocol rule — e.g. a role
    /// string outside the fixed role set.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
