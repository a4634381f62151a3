//! Actions returned by the client.

use ridesync_core::{Conflict, Progress, SessionSnapshot};
use ridesync_proto::{OutboundEvent, RideId, RidePayload};

use crate::api::ApiRequest;

/// What the client wants done, or wants shown.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Perform a REST call and report back with `ClientEvent::ApiResponse`.
    Api(ApiRequest),
    /// Send a socket event.
    Send(OutboundEvent),
    /// The session changed.
    SessionChanged(SessionSnapshot),
    /// Simulated progress advanced.
    ProgressChanged(Progress),
    /// The simulation clock stopped.
    ProgressCleared,
    /// A ride offer should be shown to the driver.
    OfferAvailable(RidePayload),
    /// A shown offer is gone.
    OfferWithdrawn(RideId),
    /// A user action failed; the session was left as it was.
    ActionFailed {
        /// Action name.
        action: &'static str,
        /// Failure message.
        reason: String,
    },
    /// An inbound update was dropped.
    ConflictDropped(Conflict),
    /// The backend pushed an error message.
    ServerError {
        /// Message.
        message: String,
    },
    /// Geolocation is unavailable. Not fatal.
    LocationUnavailable {
        /// Provider message.
        reason: String,
    },
}
