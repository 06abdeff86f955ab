//! Error types for the transport layer.

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed outright.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The connection did not reach its connected state in time.
    #[error("connection attempt timed out")]
    Timeout,

    /// The relay refused the channel attach (bad token, unknown channel).
    #[error("attach rejected: {0}")]
    AttachRejected(String),

    /// Publishing a message failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The channel is closed; no further publishes or receives.
    #[error("channel closed")]
    ChannelClosed,
}
