//! REST routes, request bodies and the response envelope.
//!
//! Paths follow the backend's ride routes. Transport (HTTP client, base URL,
//! auth header) is the caller's concern.

use serde::{Deserialize, Serialize};

use crate::payloads::{GeoPoint, Location, RideId, RidePayload};

/// HTTP verb of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
}

impl HttpMethod {
    /// Upper-case verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// Method and path of a backend route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Path relative to the API base URL.
    pub path: String,
}

impl Route {
    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self { method, path: path.into() }
    }

    /// `POST /ride/request`
    pub fn request_ride() -> Self {
        Self::new(HttpMethod::Post, "/ride/request")
    }

    /// `PATCH /ride/accept/{id}`
    pub fn accept(id: &RideId) -> Self {
        Self::new(HttpMethod::Patch, format!("/ride/accept/{id}"))
    }

    /// `PATCH /ride/start/{id}`
    pub fn start(id: &RideId) -> Self {
        Self::new(HttpMethod::Patch, format!("/ride/start/{id}"))
    }

    /// `PATCH /ride/cancel/{id}`
    pub fn cancel(id: &RideId) -> Self {
        Self::new(HttpMethod::Patch, format!("/ride/cancel/{id}"))
    }

    /// `PATCH /ride/complete/{id}`
    pub fn complete(id: &RideId) -> Self {
        Self::new(HttpMethod::Patch, format!("/ride/complete/{id}"))
    }

    /// `GET /ride/active-ride/{id}`
    pub fn active_ride(id: &RideId) -> Self {
        Self::new(HttpMethod::Get, format!("/ride/active-ride/{id}"))
    }

    /// `GET /ride/new-rides`
    pub fn new_rides() -> Self {
        Self::new(HttpMethod::Get, "/ride/new-rides")
    }
}

/// Body of `POST /ride/request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestBody {
    /// Pickup point.
    pub pickup_location: Location,
    /// Drop-off point.
    pub dropoff_location: Location,
    /// Vehicle class wire name.
    pub vehicle_type: String,
    /// Client-side fare estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
    /// Client-side distance estimate in kilometres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Body of `PATCH /ride/accept/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    /// Driver position at acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_location: Option<GeoPoint>,
}

/// Body of `PATCH /ride/complete/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    /// Actual drop-off position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_location: Option<GeoPoint>,
}

/// Response envelope shared by every ride route.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    /// Whether the backend accepted the call.
    #[serde(default)]
    pub success: bool,
    /// Affected ride.
    #[serde(default)]
    pub ride: Option<RidePayload>,
    /// Ride list, for listing routes.
    #[serde(default)]
    pub rides: Option<Vec<RidePayload>>,
    /// Failure or status message.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_embed_ride_id() {
        let id = RideId::new("r5");
        assert_eq!(Route::accept(&id).path, "/ride/accept/r5");
        assert_eq!(Route::accept(&id).method, HttpMethod::Patch);
        assert_eq!(Route::active_ride(&id).method, HttpMethod::Get);
        assert_eq!(Route::request_ride().method.as_str(), "POST");
    }

    #[test]
    fn envelope_defaults() {
        let envelope: ApiEnvelope = serde_json::from_str(r#"{"message":"nope"}"#).unwrap();
        assert!(!envelope.success);
        assert!(envelope.ride.is_none());
        assert_eq!(envelope.message.as_deref(), Some("nope"));
    }

    #[test]
    fn request_body_is_camel_case() {
        let body = RideRequestBody {
            pickup_location: Location::new(28.6139, 77.209),
            dropoff_location: Location::new(28.4595, 77.0266),
            vehicle_type: "uberx".into(),
            fare: None,
            distance: Some(20.0),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["vehicleType"], "uberx");
        assert_eq!(json["pickupLocation"]["lat"], 28.6139);
        assert!(json.get("fare").is_none());
    }
}
