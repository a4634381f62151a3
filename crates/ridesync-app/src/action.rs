//! App actions
//!
//! Actions produced by the App state machine for the runtime to execute.

use ridesync_core::VehicleClass;
use ridesync_proto::{GeoPoint, Location, RideId};

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    /// Quit the application.
    Quit,

    /// Open the transport channel.
    Connect,

    /// Close the transport channel.
    Disconnect,

    /// Request a ride.
    RequestRide {
        /// Pickup point.
        pickup: Location,
        /// Drop-off point.
        dropoff: Location,
        /// Vehicle class.
        vehicle: VehicleClass,
    },

    /// Accept an offered ride.
    AcceptRide {
        /// Offered ride.
        ride_id: RideId,
    },

    /// Decline an offered ride.
    RejectOffer {
        /// Offered ride.
        ride_id: RideId,
    },

    /// Start the accepted ride.
    StartRide,

    /// Complete the started ride.
    CompleteRide,

    /// Cancel the active ride.
    CancelRide,

    /// Reset a finished session.
    ResetSession,

    /// Report a geolocation fix.
    UpdateLocation(GeoPoint),

    /// Report a geolocation failure.
    LocationFailed {
        /// Provider message.
        reason: String,
    },
}
