//! REST call model.
//!
//! The client never performs HTTP itself. It emits [`ApiRequest`]s as
//! actions; whoever executes them (a [`RideApi`] implementation) reports the
//! outcome back as `ClientEvent::ApiResponse` with the same [`RequestId`].

use async_trait::async_trait;
use ridesync_proto::{
    AcceptBody, ApiEnvelope, CompleteBody, GeoPoint, RideId, RidePayload, RideRequestBody, Route,
    WireStatus,
};
use serde_json::Value;

/// Correlates an [`ApiRequest`] with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A REST call the client wants made.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    /// `POST /ride/request`.
    RequestRide {
        /// Request body.
        body: RideRequestBody,
    },
    /// `PATCH /ride/accept/{id}`.
    AcceptRide {
        /// Ride to accept.
        ride_id: RideId,
        /// Driver position, if known.
        location: Option<GeoPoint>,
    },
    /// `PATCH /ride/start/{id}`.
    StartRide {
        /// Ride to start.
        ride_id: RideId,
    },
    /// `PATCH /ride/cancel/{id}`.
    CancelRide {
        /// Ride to cancel.
        ride_id: RideId,
    },
    /// `PATCH /ride/complete/{id}`.
    CompleteRide {
        /// Ride to complete.
        ride_id: RideId,
        /// Where the trip actually ended.
        dropoff: Option<GeoPoint>,
    },
    /// `GET /ride/active-ride/{id}`.
    FetchRide {
        /// Ride to fetch.
        ride_id: RideId,
    },
    /// `GET /ride/new-rides`.
    FetchOffers,
}

impl ApiCall {
    /// Route for this call.
    pub fn route(&self) -> Route {
        match self {
            Self::RequestRide { .. } => Route::request_ride(),
            Self::AcceptRide { ride_id, .. } => Route::accept(ride_id),
            Self::StartRide { ride_id } => Route::start(ride_id),
            Self::CancelRide { ride_id } => Route::cancel(ride_id),
            Self::CompleteRide { ride_id, .. } => Route::complete(ride_id),
            Self::FetchRide { ride_id } => Route::active_ride(ride_id),
            Self::FetchOffers => Route::new_rides(),
        }
    }

    /// JSON body, for calls that have one.
    pub fn body(&self) -> Result<Option<Value>, serde_json::Error> {
        let body = match self {
            Self::RequestRide { body } => serde_json::to_value(body)?,
            Self::AcceptRide { location, .. } => {
                serde_json::to_value(AcceptBody { driver_location: *location })?
            },
            Self::CompleteRide { dropoff, .. } => {
                serde_json::to_value(CompleteBody { dropoff_location: *dropoff })?
            },
            Self::StartRide { .. }
            | Self::CancelRide { .. }
            | Self::FetchRide { .. }
            | Self::FetchOffers => return Ok(None),
        };
        Ok(Some(body))
    }

    /// Ride the call targets, if any.
    pub fn ride_id(&self) -> Option<&RideId> {
        match self {
            Self::AcceptRide { ride_id, .. }
            | Self::StartRide { ride_id }
            | Self::CancelRide { ride_id }
            | Self::CompleteRide { ride_id, .. }
            | Self::FetchRide { ride_id } => Some(ride_id),
            Self::RequestRide { .. } | Self::FetchOffers => None,
        }
    }

    /// Status a successful call implies, used when the backend answers
    /// without a ride payload.
    pub fn implied_status(&self) -> Option<WireStatus> {
        match self {
            Self::AcceptRide { .. } => Some(WireStatus::Accepted),
            Self::StartRide { .. } => Some(WireStatus::Started),
            Self::CancelRide { .. } => Some(WireStatus::Cancelled),
            Self::CompleteRide { .. } => Some(WireStatus::Completed),
            Self::RequestRide { .. } | Self::FetchRide { .. } | Self::FetchOffers => None,
        }
    }

    /// Short name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestRide { .. } => "request_ride",
            Self::AcceptRide { .. } => "accept_ride",
            Self::StartRide { .. } => "start_ride",
            Self::CancelRide { .. } => "cancel_ride",
            Self::CompleteRide { .. } => "complete_ride",
            Self::FetchRide { .. } => "fetch_ride",
            Self::FetchOffers => "fetch_offers",
        }
    }
}

/// A call plus its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Correlation id.
    pub id: RequestId,
    /// The call.
    pub call: ApiCall,
}

/// Successful REST outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    /// A single ride.
    Ride(RidePayload),
    /// A list of rides.
    Offers(Vec<RidePayload>),
    /// Success without a payload.
    Done,
}

impl ApiReply {
    /// Interpret a response envelope for `call`.
    ///
    /// # Errors
    ///
    /// `Rejected` when the backend reports `success: false`.
    pub fn from_envelope(call: &ApiCall, envelope: ApiEnvelope) -> Result<Self, ApiError> {
        if !envelope.success {
            return Err(ApiError::Rejected {
                status: 200,
                message: envelope.message.unwrap_or_else(|| "request unsuccessful".to_string()),
            });
        }
        let reply = match (call, envelope.ride, envelope.rides) {
            (ApiCall::FetchOffers, _, rides) => Self::Offers(rides.unwrap_or_default()),
            (_, Some(ride), _) => Self::Ride(ride),
            (ApiCall::RequestRide { .. } | ApiCall::FetchRide { .. }, None, _) => {
                return Err(ApiError::Malformed(format!("{} response has no ride", call.name())));
            },
            (_, None, _) => Self::Done,
        };
        Ok(reply)
    }
}

/// REST failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response.
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Backend message.
        message: String,
    },

    /// HTTP 409: someone else got there first.
    #[error("ride already taken")]
    Conflict,

    /// HTTP 401.
    #[error("unauthorized")]
    Unauthorized,

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Map an HTTP status and message to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            409 => Self::Conflict,
            _ => Self::Rejected { status, message: message.into() },
        }
    }

    /// The call may not have reached the backend, or the backend could not
    /// decide it: network failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::Conflict | Self::Unauthorized | Self::Malformed(_) => false,
        }
    }
}

/// Executes REST calls.
#[async_trait]
pub trait RideApi: Send + Sync {
    /// Perform one call.
    async fn execute(&self, call: ApiCall) -> Result<ApiReply, ApiError>;
}
