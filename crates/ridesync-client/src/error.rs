//! Client error types.

use ridesync_core::RideStatus;
use ridesync_proto::{RideId, Role};

/// Errors returned by [`crate::Client::handle`].
///
/// All of these are local: nothing was sent over the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The session's status or role does not permit the action.
    #[error("cannot {action} while {status} as {role}")]
    InvalidStateForAction {
        /// Action name.
        action: &'static str,
        /// Current status.
        status: RideStatus,
        /// Session role.
        role: Role,
    },

    /// The same kind of action is still waiting for its response.
    #[error("{action} already in flight")]
    ActionInFlight {
        /// Action name.
        action: &'static str,
    },

    /// No offer with this ride id.
    #[error("no offer for ride {0}")]
    UnknownOffer(RideId),
}
