//! Error types for the core state machines.

use ridesync_proto::{RideId, Role};

use crate::ride::RideStatus;

/// Transport channel errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Send attempted while the socket is not connected.
    #[error("channel is not connected")]
    NotConnected,

    /// Server closed the socket with an authentication close code.
    #[error("authentication rejected by server (close code {code})")]
    AuthRejected {
        /// Close code sent by the server.
        code: u16,
    },

    /// Reconnect attempts used up.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// `open` called with a different token while a connection is live.
    #[error("channel already open for a different token")]
    TokenMismatch,

    /// Outbound event could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl From<ridesync_proto::EncodeError> for ChannelError {
    fn from(err: ridesync_proto::EncodeError) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Why an inbound update was dropped without changing the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Conflict {
    /// Update for a different ride than the active one.
    #[error("{input} for ride {received} while session holds ride {expected}")]
    RideMismatch {
        /// Input name.
        input: &'static str,
        /// Active ride.
        expected: RideId,
        /// Ride named by the update.
        received: RideId,
    },

    /// Ride-scoped update while no ride is bound.
    #[error("{input} for ride {received} but no ride is bound")]
    Unbound {
        /// Input name.
        input: &'static str,
        /// Ride named by the update.
        received: RideId,
    },

    /// Update for a ride that already reached a terminal status.
    #[error("{input} for retired ride {ride_id}")]
    Retired {
        /// Input name.
        input: &'static str,
        /// The retired ride.
        ride_id: RideId,
    },

    /// Sequence number at or below the last applied one.
    #[error("stale event seq {seq} (last applied {last})")]
    Stale {
        /// Incoming sequence number.
        seq: u64,
        /// Last applied sequence number.
        last: u64,
    },

    /// Ride-scoped update after the session reached a terminal status.
    #[error("{input} after terminal status {status}")]
    AfterTerminal {
        /// Input name.
        input: &'static str,
        /// Terminal status.
        status: RideStatus,
    },

    /// Update that would move the session backwards.
    #[error("{input} is behind current status {status}")]
    Outdated {
        /// Input name.
        input: &'static str,
        /// Current status.
        status: RideStatus,
    },

    /// No edge from the current status for this update.
    #[error("{input} is not a legal transition from {from}")]
    IllegalTransition {
        /// Input name.
        input: &'static str,
        /// Current status.
        from: RideStatus,
    },

    /// Update that this role cannot apply from this source.
    #[error("{input} cannot be applied by a {role} session")]
    RoleMismatch {
        /// Input name.
        input: &'static str,
        /// Session role.
        role: Role,
    },

    /// Accept without enough details to build the counterparty.
    #[error("{input} for ride {ride_id} carries no counterparty")]
    IncompleteCounterparty {
        /// Input name.
        input: &'static str,
        /// Ride named by the update.
        ride_id: RideId,
    },
}

impl Conflict {
    /// Whether the update skipped ahead of the session, meaning events were
    /// probably missed and a resync is worthwhile.
    pub fn suggests_resync(&self) -> bool {
        matches!(self, Self::IllegalTransition { from, .. } if from.is_active())
    }
}
