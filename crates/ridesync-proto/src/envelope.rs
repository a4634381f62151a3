//! The `{event, data}` envelope every socket frame is wrapped in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DecodeError, EncodeError};

/// Outer shape of every socket frame.
///
/// `seq` is the backend's monotonic event counter. It is optional on the wire;
/// frames without it skip stale-event detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, before normalisation.
    pub event: String,
    /// Event payload. Missing `data` decodes as `null`.
    #[serde(default)]
    pub data: Value,
    /// Backend event sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Envelope {
    /// Envelope without a sequence number.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data, seq: None }
    }

    /// Attach a backend sequence number.
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Parse a text frame.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(raw).map_err(DecodeError::Malformed)
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}
