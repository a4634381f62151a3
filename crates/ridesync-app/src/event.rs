//! User input events.

use ridesync_core::VehicleClass;
use ridesync_proto::{GeoPoint, Location, RideId};

/// Input to [`crate::App::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Request a ride (riders).
    RequestRide {
        /// Pickup point.
        pickup: Location,
        /// Drop-off point.
        dropoff: Location,
        /// Vehicle class.
        vehicle: VehicleClass,
    },
    /// Accept an offer (drivers).
    AcceptOffer {
        /// Offered ride.
        ride_id: RideId,
    },
    /// Decline an offer (drivers).
    RejectOffer {
        /// Offered ride.
        ride_id: RideId,
    },
    /// Start the trip (drivers).
    StartRide,
    /// Complete the trip (drivers).
    CompleteRide,
    /// Cancel the active ride.
    CancelRide,
    /// Dismiss a finished ride and clear notices.
    Dismiss,
    /// New geolocation fix.
    LocationFix(GeoPoint),
    /// Geolocation failed.
    LocationError(String),
    /// Open the socket.
    Connect,
    /// Close the socket.
    Disconnect,
    /// Leave the application.
    Quit,
}
