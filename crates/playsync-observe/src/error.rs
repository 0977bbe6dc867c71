//! Transport errors.
//!
//! Observation propagation itself is infallible; errors only appear where
//! values are encoded for, or decoded from, another execution context.

use thiserror::Error;

/// Failure while exchanging messages across an execution boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An outbound message could not be encoded.
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] serde_json::Error),
    /// An inbound payload is not a valid message.
    #[error("failed to deserialize message: {0}")]
    Deserialize(#[source] serde_json::Error),
    /// The other end of the channel is gone.
    #[error("message channel disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether the port can still be used after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}
