//! Inbound socket events.
//!
//! The backend has used several spellings for the same event over time
//! (`ride:accepted` and `ride_accepted`, `new:ride` and `new_ride`, ...).
//! [`EventName::parse`] folds every known spelling into one closed set so the
//! rest of the client only ever matches on [`DomainEvent`] variants.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    envelope::Envelope,
    errors::DecodeError,
    payloads::{DriverLocation, RideId, RidePayload},
};

/// Normalised inbound event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A driver accepted a ride.
    RideAccepted,
    /// The trip started.
    RideStarted,
    /// The ride was cancelled.
    RideCancelled,
    /// The trip finished.
    RideCompleted,
    /// Another driver won the ride.
    RideTaken,
    /// A new ride is open for drivers.
    NewRide,
    /// Driver position update.
    DriverLocation,
    /// Backend-reported error.
    Error,
    /// Registration acknowledgement.
    Registered,
}

impl EventName {
    /// Map any known spelling to its normalised name.
    pub fn parse(name: &str) -> Option<Self> {
        let parsed = match name {
            "ride:accepted" | "ride_accepted" => Self::RideAccepted,
            "ride:started" | "ride_started" => Self::RideStarted,
            "ride:cancelled" | "ride_cancelled" => Self::RideCancelled,
            "ride:completed" | "ride_completed" => Self::RideCompleted,
            "ride:taken" | "ride_taken" => Self::RideTaken,
            "new:ride" | "new_ride" => Self::NewRide,
            "driver_location" | "driver_location_update" | "driver:location" => {
                Self::DriverLocation
            },
            "error" => Self::Error,
            "registered" => Self::Registered,
            _ => return None,
        };
        Some(parsed)
    }

    /// Canonical spelling, used in logs and error messages.
    pub fn canonical(self) -> &'static str {
        match self {
            Self::RideAccepted => "ride:accepted",
            Self::RideStarted => "ride:started",
            Self::RideCancelled => "ride:cancelled",
            Self::RideCompleted => "ride:completed",
            Self::RideTaken => "ride:taken",
            Self::NewRide => "new:ride",
            Self::DriverLocation => "driver_location",
            Self::Error => "error",
            Self::Registered => "registered",
        }
    }
}

/// Typed inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A driver accepted the ride; carries driver details for riders.
    RideAccepted(RidePayload),
    /// The trip started.
    RideStarted(RidePayload),
    /// The ride was cancelled.
    RideCancelled(RidePayload),
    /// The trip finished.
    RideCompleted(RidePayload),
    /// Another driver won the ride.
    RideTaken(RidePayload),
    /// A new ride offer for drivers.
    NewRideAvailable(RidePayload),
    /// Driver position update.
    DriverLocationUpdate(DriverLocation),
    /// Backend-reported error.
    Error {
        /// Human-readable message.
        message: String,
    },
    /// Registration acknowledgement.
    Registered {
        /// User id the backend registered this socket under.
        user_id: Option<String>,
    },
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredData {
    #[serde(default)]
    user_id: Option<String>,
}

impl DomainEvent {
    /// Decode the payload of an envelope.
    pub fn decode(envelope: &Envelope) -> Result<Self, DecodeError> {
        let name = EventName::parse(&envelope.event)
            .ok_or_else(|| DecodeError::UnknownEvent(envelope.event.clone()))?;

        let event = match name {
            EventName::RideAccepted => Self::RideAccepted(ride(name, &envelope.data)?),
            EventName::RideStarted => Self::RideStarted(ride(name, &envelope.data)?),
            EventName::RideCancelled => Self::RideCancelled(ride(name, &envelope.data)?),
            EventName::RideCompleted => Self::RideCompleted(ride(name, &envelope.data)?),
            EventName::RideTaken => Self::RideTaken(ride(name, &envelope.data)?),
            EventName::NewRide => Self::NewRideAvailable(ride(name, &envelope.data)?),
            EventName::DriverLocation => {
                Self::DriverLocationUpdate(typed(name, &envelope.data)?)
            },
            EventName::Error => {
                let message = match &envelope.data {
                    Value::String(message) => message.clone(),
                    Value::Null => String::new(),
                    other => typed::<ErrorData>(name, other)?.message.unwrap_or_default(),
                };
                Self::Error { message }
            },
            EventName::Registered => {
                let user_id = match &envelope.data {
                    Value::Null => None,
                    other => typed::<RegisteredData>(name, other)?.user_id,
                };
                Self::Registered { user_id }
            },
        };
        Ok(event)
    }

    /// Parse and decode a raw text frame.
    pub fn from_frame(raw: &str) -> Result<(Option<u64>, Self), DecodeError> {
        let envelope = Envelope::parse(raw)?;
        let event = Self::decode(&envelope)?;
        Ok((envelope.seq, event))
    }

    /// Normalised name of the event.
    pub fn name(&self) -> EventName {
        match self {
            Self::RideAccepted(_) => EventName::RideAccepted,
            Self::RideStarted(_) => EventName::RideStarted,
            Self::RideCancelled(_) => EventName::RideCancelled,
            Self::RideCompleted(_) => EventName::RideCompleted,
            Self::RideTaken(_) => EventName::RideTaken,
            Self::NewRideAvailable(_) => EventName::NewRide,
            Self::DriverLocationUpdate(_) => EventName::DriverLocation,
            Self::Error { .. } => EventName::Error,
            Self::Registered { .. } => EventName::Registered,
        }
    }

    /// Ride this event refers to, if any.
    pub fn ride_id(&self) -> Option<&RideId> {
        match self {
            Self::RideAccepted(ride)
            | Self::RideStarted(ride)
            | Self::RideCancelled(ride)
            | Self::RideCompleted(ride)
            | Self::RideTaken(ride)
            | Self::NewRideAvailable(ride) => Some(&ride.id),
            Self::DriverLocationUpdate(location) => location.ride_id.as_ref(),
            Self::Error { .. } | Self::Registered { .. } => None,
        }
    }
}

fn ride(name: EventName, data: &Value) -> Result<RidePayload, DecodeError> {
    typed(name, data)
}

fn typed<T>(name: EventName, data: &Value) -> Result<T, DecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(data)
        .map_err(|source| DecodeError::InvalidPayload { event: name.canonical(), source })
}
