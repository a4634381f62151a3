//! Protocol error types.

use thiserror::Error;

/// Failure to turn a raw socket frame into a domain event.
///
/// Decode errors are never fatal: the router logs them and drops the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not a JSON envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Envelope names an event this client does not handle.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    /// Event is known but its `data` does not match the expected shape.
    #[error("invalid `{event}` payload: {source}")]
    InvalidPayload {
        /// Canonical event name.
        event: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to serialize an outbound frame or REST body.
#[derive(Debug, Error)]
#[error("failed to encode frame: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);
