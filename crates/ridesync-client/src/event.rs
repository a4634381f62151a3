//! Events fed into the client.

use ridesync_core::{ConnectionState, Routed, VehicleClass};
use ridesync_proto::{GeoPoint, Location, RideId};

use crate::api::{ApiError, ApiReply, RequestId};

/// Input to [`crate::Client::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Rider asks for a ride.
    RequestRide {
        /// Pickup point.
        pickup: Location,
        /// Drop-off point.
        dropoff: Location,
        /// Vehicle class.
        vehicle: VehicleClass,
    },
    /// Driver accepts an offer.
    AcceptRide {
        /// Offered ride.
        ride_id: RideId,
    },
    /// Driver starts the trip.
    StartRide,
    /// Driver completes the trip.
    CompleteRide,
    /// Either side cancels.
    CancelRide,
    /// Driver declines an offer locally.
    RejectOffer {
        /// Offered ride.
        ride_id: RideId,
    },
    /// Dismiss a finished ride.
    Reset,
    /// Outcome of an earlier [`crate::ClientAction::Api`].
    ApiResponse {
        /// Correlation id from the request.
        request_id: RequestId,
        /// Outcome.
        result: Result<ApiReply, ApiError>,
    },
    /// Decoded socket event.
    Socket(Routed),
    /// Socket connectivity changed.
    ConnectionChanged(ConnectionState),
    /// New geolocation fix.
    LocationChanged(GeoPoint),
    /// Geolocation failed.
    LocationUnavailable {
        /// Provider message.
        reason: String,
    },
    /// Timer tick: clock, matchmaking timeout, polling.
    Tick,
}
