//! Outbound socket events.
//!
//! Outbound names are canonical; the client never emits legacy spellings.

use serde::Serialize;

use crate::{
    errors::EncodeError,
    payloads::{GeoPoint, RideId, Role},
};

/// Event sent from this client over the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    /// Announce the session role after connecting.
    #[serde(rename = "register")]
    Register {
        /// Session role.
        role: Role,
    },

    /// Driver accepted a ride.
    #[serde(rename = "ride:accept")]
    RideAccept {
        /// Accepted ride.
        #[serde(rename = "rideId")]
        ride_id: RideId,
        /// Driver latitude at acceptance.
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        /// Driver longitude at acceptance.
        #[serde(skip_serializing_if = "Option::is_none")]
        lng: Option<f64>,
    },

    /// Driver started the trip.
    #[serde(rename = "ride:start")]
    RideStart {
        /// Started ride.
        #[serde(rename = "rideId")]
        ride_id: RideId,
    },

    /// Either party cancelled.
    #[serde(rename = "ride:cancel")]
    RideCancel {
        /// Cancelled ride.
        #[serde(rename = "rideId")]
        ride_id: RideId,
    },

    /// Driver position during a ride.
    #[serde(rename = "driver_location")]
    DriverLocation {
        /// Ride in progress.
        #[serde(rename = "rideId")]
        ride_id: RideId,
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
    },
}

impl OutboundEvent {
    /// Accept event carrying an optional driver position.
    pub fn accept(ride_id: RideId, location: Option<GeoPoint>) -> Self {
        Self::RideAccept { ride_id, lat: location.map(|p| p.lat), lng: location.map(|p| p.lng) }
    }

    /// Location event for a ride.
    pub fn location(ride_id: RideId, point: GeoPoint) -> Self {
        Self::DriverLocation { ride_id, lat: point.lat, lng: point.lng }
    }

    /// Canonical event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::RideAccept { .. } => "ride:accept",
            Self::RideStart { .. } => "ride:start",
            Self::RideCancel { .. } => "ride:cancel",
            Self::DriverLocation { .. } => "driver_location",
        }
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn register_frame() {
        let frame = OutboundEvent::Register { role: Role::Driver }.to_frame().unwrap();
        assert_snapshot!(frame, @r#"{"event":"register","data":{"role":"driver"}}"#);
    }

    #[test]
    fn accept_frame_omits_unknown_position() {
        let frame = OutboundEvent::accept(RideId::new("r5"), None).to_frame().unwrap();
        assert_snapshot!(frame, @r#"{"event":"ride:accept","data":{"rideId":"r5"}}"#);
    }

    #[test]
    fn cancel_frame() {
        let frame = OutboundEvent::RideCancel { ride_id: RideId::new("r1") }.to_frame().unwrap();
        assert_snapshot!(frame, @r#"{"event":"ride:cancel","data":{"rideId":"r1"}}"#);
    }

    #[test]
    fn location_frame() {
        let frame = OutboundEvent::location(RideId::new("r1"), GeoPoint::new(28.5, 77.25))
            .to_frame()
            .unwrap();
        assert_snapshot!(frame, @r#"{"event":"driver_location","data":{"rideId":"r1","lat":28.5,"lng":77.25}}"#);
    }
}
