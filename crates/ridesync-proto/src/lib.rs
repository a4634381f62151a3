//! Wire format for the ride lifecycle protocol.
//!
//! Socket frames are JSON envelopes `{event, data, seq?}`. Inbound event
//! names are normalised once, here, into a closed [`DomainEvent`] enum; the
//! rest of the client never matches on raw strings. REST routes and bodies
//! live alongside so both channels share one set of payload types.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod errors;
pub mod event;
pub mod outbound;
pub mod payloads;
pub mod rest;

pub use envelope::Envelope;
pub use errors::{DecodeError, EncodeError};
pub use event::{DomainEvent, EventName};
pub use outbound::OutboundEvent;
pub use payloads::{
    DriverLocation, GeoPoint, Location, PartyInfo, RideId, RidePayload, Role, VehicleInfo,
    WireStatus,
};
pub use rest::{AcceptBody, ApiEnvelope, CompleteBody, HttpMethod, RideRequestBody, Route};
