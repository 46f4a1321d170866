//! Error types for the Offer Patrol client.

use thiserror::Error;

/// Errors that can occur when using the Offer Patrol client.
#[derive(Debug, Error)]
pub enum OfferPatrolError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to establish a new connection to the game server.
    #[error("connect error: {0}")]
    Connect(String),

    /// The configured session endpoint could not be turned into a valid URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Offer Patrol client operations.
pub type Result<T> = std::result::Result<T, OfferPatrolError>;
