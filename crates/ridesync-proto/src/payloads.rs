//! Ride payloads shared by socket events and REST responses.
//!
//! The backend is loose about numeric types (fares sometimes arrive as
//! `"450.00"`), so numeric fields accept both JSON numbers and numeric
//! strings. Every field except the ride id is optional: socket events carry
//! partial rides, REST responses carry full ones.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque ride identifier assigned by the backend (`_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(String);

impl RideId {
    /// Wrap a backend identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RideId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RideId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Session role, fixed at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Requests rides.
    Rider,
    /// Accepts and drives rides.
    Driver,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rider => "rider",
            Self::Driver => "driver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bare coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl GeoPoint {
    /// Build a coordinate.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A coordinate with an optional human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Street address, when geocoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    /// Location without an address.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng, address: None }
    }

    /// Attach an address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Coordinate part of the location.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

impl From<GeoPoint> for Location {
    fn from(point: GeoPoint) -> Self {
        Self::new(point.lat, point.lng)
    }
}

/// Ride status as reported by the backend (`rideStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    /// Waiting for a driver.
    #[serde(alias = "requested")]
    Pending,
    /// A driver accepted.
    Accepted,
    /// Trip in progress.
    #[serde(alias = "ongoing", alias = "in_progress")]
    Started,
    /// Trip finished.
    Completed,
    /// Cancelled by either party or the backend.
    #[serde(alias = "canceled")]
    Cancelled,
    /// Backend gave up on the ride.
    Failed,
    /// Anything this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Vehicle details attached to a driver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleInfo {
    /// Make and model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Registration plate.
    #[serde(default, alias = "number", alias = "vehicleNumber", skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    /// Paint colour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Driver or rider details embedded in a ride.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartyInfo {
    /// Backend user id.
    #[serde(default, rename = "_id", alias = "id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Average rating.
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Vehicle, for drivers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleInfo>,
}

/// A ride as carried by socket events and REST responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidePayload {
    /// Ride id.
    #[serde(rename = "_id", alias = "rideId")]
    pub id: RideId,
    /// Backend status, when included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_status: Option<WireStatus>,
    /// Pickup point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<Location>,
    /// Drop-off point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_location: Option<Location>,
    /// Fare in local currency.
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
    /// Route distance in kilometres.
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Estimated minutes to arrival or destination.
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    /// Vehicle class requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    /// Assigned driver id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    /// Requesting rider id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rider_id: Option<String>,
    /// Assigned driver details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<PartyInfo>,
    /// Rider details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rider: Option<PartyInfo>,
    /// Cancellation or failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Creation timestamp, as sent by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl RidePayload {
    /// Payload carrying only an id.
    pub fn new(id: impl Into<RideId>) -> Self {
        Self {
            id: id.into(),
            ride_status: None,
            pickup_location: None,
            dropoff_location: None,
            fare: None,
            distance: None,
            eta: None,
            vehicle_type: None,
            driver_id: None,
            rider_id: None,
            driver: None,
            rider: None,
            reason: None,
            created_at: None,
        }
    }

    /// Set the backend status.
    #[must_use]
    pub fn with_status(mut self, status: WireStatus) -> Self {
        self.ride_status = Some(status);
        self
    }

    /// Set the driver details.
    #[must_use]
    pub fn with_driver(mut self, driver: PartyInfo) -> Self {
        self.driver_id = driver.id.clone().or(self.driver_id);
        self.driver = Some(driver);
        self
    }

    /// Set the rider details.
    #[must_use]
    pub fn with_rider(mut self, rider: PartyInfo) -> Self {
        self.rider_id = rider.id.clone().or(self.rider_id);
        self.rider = Some(rider);
        self
    }

    /// Set pickup and drop-off.
    #[must_use]
    pub fn with_route(mut self, pickup: Location, dropoff: Location) -> Self {
        self.pickup_location = Some(pickup);
        self.dropoff_location = Some(dropoff);
        self
    }

    /// Set fare and distance.
    #[must_use]
    pub fn with_fare(mut self, fare: f64, distance_km: f64) -> Self {
        self.fare = Some(fare);
        self.distance = Some(distance_km);
        self
    }
}

/// Driver position broadcast during a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    /// Ride the position belongs to, when the backend includes it.
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<RideId>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl DriverLocation {
    /// Coordinate part of the update.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!("expected number, found {other}"))),
    }
}
