//! In-memory ride backend.
//!
//! Answers [`ApiCall`]s the way the real backend does and produces the socket
//! pushes that go with each change. Pushes carry a global, increasing `seq`.
//! Nothing is delivered here: the caller decides when (and in which order)
//! responses and pushes reach their participants.

use std::collections::{BTreeMap, BTreeSet};

use ridesync_client::{ApiCall, ApiError, ApiReply};
use ridesync_proto::{
    DriverLocation, Envelope, OutboundEvent, PartyInfo, RideId, RidePayload, Role, VehicleInfo,
    WireStatus,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// A socket frame addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    /// Recipient user id.
    pub to: String,
    /// Encoded frame.
    pub frame: String,
}

#[derive(Debug, Clone)]
struct RideRecord {
    payload: RidePayload,
    rider: String,
    driver: Option<String>,
}

impl RideRecord {
    fn status(&self) -> WireStatus {
        self.payload.ride_status.unwrap_or(WireStatus::Unknown)
    }

    fn involves(&self, user: &str) -> bool {
        self.rider == user || self.driver.as_deref() == Some(user)
    }
}

/// Simulated backend.
#[derive(Debug, Default)]
pub struct SimBackend {
    rides: BTreeMap<RideId, RideRecord>,
    users: BTreeMap<String, Role>,
    connected: BTreeSet<String>,
    next_ride: u64,
    seq: u64,
    calls: u64,
}

impl SimBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a user known.
    pub fn add_user(&mut self, user: &str, role: Role) {
        self.users.insert(user.to_string(), role);
    }

    /// Ride by id.
    pub fn ride(&self, ride_id: &RideId) -> Option<&RidePayload> {
        self.rides.get(ride_id).map(|r| &r.payload)
    }

    /// Number of rides created.
    pub fn ride_count(&self) -> usize {
        self.rides.len()
    }

    /// REST calls served.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Last sequence number handed out.
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Serve one REST call on behalf of `user`.
    pub fn handle_call(&mut self, user: &str, call: &ApiCall) -> (Result<ApiReply, ApiError>, Vec<Push>) {
        self.calls += 1;
        let mut pushes = Vec::new();
        let result = match call {
            ApiCall::RequestRide { body } => {
                self.next_ride += 1;
                let ride_id = RideId::new(format!("ride-{}", self.next_ride));
                let mut payload = RidePayload::new(ride_id.clone())
                    .with_status(WireStatus::Pending)
                    .with_route(body.pickup_location.clone(), body.dropoff_location.clone())
                    .with_rider(party(user));
                payload.fare = body.fare;
                payload.distance = body.distance;
                payload.vehicle_type = Some(body.vehicle_type.clone());
                self.rides.insert(ride_id, RideRecord {
                    payload: payload.clone(),
                    rider: user.to_string(),
                    driver: None,
                });
                for driver in self.drivers() {
                    pushes.extend(self.push(&driver, "new:ride", &payload));
                }
                Ok(ApiReply::Ride(payload))
            },
            ApiCall::AcceptRide { ride_id, .. } => self.accept(user, ride_id, &mut pushes),
            ApiCall::StartRide { ride_id } => {
                self.advance(user, ride_id, WireStatus::Accepted, WireStatus::Started, "ride:started", &mut pushes)
            },
            ApiCall::CompleteRide { ride_id, .. } => self.advance(
                user,
                ride_id,
                WireStatus::Started,
                WireStatus::Completed,
                "ride:completed",
                &mut pushes,
            ),
            ApiCall::CancelRide { ride_id } => self.cancel(user, ride_id, None, &mut pushes),
            ApiCall::FetchRide { ride_id } => match self.rides.get(ride_id) {
                Some(record) if record.involves(user) => Ok(ApiReply::Ride(record.payload.clone())),
                _ => Err(not_found(ride_id)),
            },
            ApiCall::FetchOffers => Ok(ApiReply::Offers(
                self.rides
                    .values()
                    .filter(|r| r.status() == WireStatus::Pending)
                    .map(|r| r.payload.clone())
                    .collect(),
            )),
        };
        debug!(user, call = call.name(), ok = result.is_ok(), pushes = pushes.len(), "call served");
        (result, pushes)
    }

    /// Handle a socket event sent by `user`.
    pub fn handle_socket(&mut self, user: &str, event: &OutboundEvent) -> Vec<Push> {
        match event {
            OutboundEvent::Register { role } => {
                self.users.insert(user.to_string(), *role);
                self.connected.insert(user.to_string());
                self.push(user, "registered", &json!({ "userId": user }))
            },
            OutboundEvent::DriverLocation { ride_id, lat, lng } => {
                let Some(record) = self.rides.get(ride_id) else {
                    return Vec::new();
                };
                if record.driver.as_deref() != Some(user) {
                    return Vec::new();
                }
                let rider = record.rider.clone();
                let update = DriverLocation { ride_id: Some(ride_id.clone()), lat: *lat, lng: *lng };
                self.push(&rider, "driver_location", &update)
            },
            // REST already applied these; the socket copy is informational.
            OutboundEvent::RideAccept { .. }
            | OutboundEvent::RideStart { .. }
            | OutboundEvent::RideCancel { .. } => Vec::new(),
        }
    }

    /// Cancel a ride from the server side, e.g. by support.
    ///
    /// Both parties (and, for a pending ride, every driver) are told.
    pub fn server_cancel(&mut self, ride_id: &RideId, reason: &str) -> Vec<Push> {
        let mut pushes = Vec::new();
        let rider = self.rides.get(ride_id).map(|r| r.rider.clone()).unwrap_or_default();
        match self.cancel(&rider, ride_id, Some(reason), &mut pushes) {
            Ok(ApiReply::Ride(payload)) => pushes.extend(self.push(&rider, "ride:cancelled", &payload)),
            Ok(_) => {},
            Err(err) => warn!(%ride_id, error = %err, "server cancel refused"),
        }
        pushes
    }

    fn accept(&mut self, user: &str, ride_id: &RideId, pushes: &mut Vec<Push>) -> Result<ApiReply, ApiError> {
        if self.users.get(user) != Some(&Role::Driver) {
            return Err(ApiError::from_status(403, "only drivers can accept rides"));
        }
        let record = self.rides.get_mut(ride_id).ok_or_else(|| not_found(ride_id))?;
        if record.status() != WireStatus::Pending {
            return Err(ApiError::Conflict);
        }
        record.driver = Some(user.to_string());
        record.payload = record.payload.clone().with_status(WireStatus::Accepted).with_driver(driver_party(user));
        record.payload.eta = Some(5.0);

        let payload = record.payload.clone();
        let rider = record.rider.clone();
        pushes.extend(self.push(&rider, "ride:accepted", &payload));
        for driver in self.drivers().into_iter().filter(|d| d != user) {
            pushes.extend(self.push(&driver, "ride:taken", &payload));
        }
        Ok(ApiReply::Ride(payload))
    }

    fn advance(
        &mut self,
        user: &str,
        ride_id: &RideId,
        from: WireStatus,
        to: WireStatus,
        event: &str,
        pushes: &mut Vec<Push>,
    ) -> Result<ApiReply, ApiError> {
        let record = self.rides.get_mut(ride_id).ok_or_else(|| not_found(ride_id))?;
        if record.driver.as_deref() != Some(user) {
            return Err(ApiError::from_status(403, "not your ride"));
        }
        if record.status() != from {
            return Err(ApiError::from_status(400, format!("ride is {:?}", record.status())));
        }
        record.payload.ride_status = Some(to);
        let payload = record.payload.clone();
        let rider = record.rider.clone();
        pushes.extend(self.push(&rider, event, &payload));
        Ok(ApiReply::Ride(payload))
    }

    fn cancel(
        &mut self,
        user: &str,
        ride_id: &RideId,
        reason: Option<&str>,
        pushes: &mut Vec<Push>,
    ) -> Result<ApiReply, ApiError> {
        let record = self.rides.get_mut(ride_id).ok_or_else(|| not_found(ride_id))?;
        if !record.involves(user) {
            return Err(ApiError::from_status(403, "not your ride"));
        }
        let was = record.status();
        if !matches!(was, WireStatus::Pending | WireStatus::Accepted | WireStatus::Started) {
            return Err(ApiError::from_status(400, format!("ride is {was:?}")));
        }
        record.payload.ride_status = Some(WireStatus::Cancelled);
        record.payload.reason = Some(reason.unwrap_or("cancelled by user").to_string());

        let payload = record.payload.clone();
        let counterparty = if record.rider == user { record.driver.clone() } else { Some(record.rider.clone()) };
        if let Some(other) = counterparty {
            pushes.extend(self.push(&other, "ride:cancelled", &payload));
        }
        if was == WireStatus::Pending {
            for driver in self.drivers().into_iter().filter(|d| d != user) {
                pushes.extend(self.push(&driver, "ride:cancelled", &payload));
            }
        }
        Ok(ApiReply::Ride(payload))
    }

    fn drivers(&self) -> Vec<String> {
        self.users
            .iter()
            .filter(|(_, role)| **role == Role::Driver)
            .map(|(user, _)| user.clone())
            .collect()
    }

    fn push(&mut self, to: &str, event: &str, data: &impl Serialize) -> Vec<Push> {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(err) => {
                warn!(event, error = %err, "push payload not encodable");
                Value::Null
            },
        };
        self.seq += 1;
        match Envelope::new(event, data).with_seq(self.seq).to_frame() {
            Ok(frame) => vec![Push { to: to.to_string(), frame }],
            Err(err) => {
                warn!(event, error = %err, "push not encodable");
                Vec::new()
            },
        }
    }
}

fn party(user: &str) -> PartyInfo {
    PartyInfo {
        id: Some(user.to_string()),
        name: Some(user.to_string()),
        phone: Some("+91 98765 43210".to_string()),
        rating: Some(4.8),
        vehicle: None,
    }
}

fn driver_party(user: &str) -> PartyInfo {
    PartyInfo {
        vehicle: Some(VehicleInfo {
            model: Some("Swift Dzire".to_string()),
            plate: Some("DL 01 AB 1234".to_string()),
            color: Some("white".to_string()),
        }),
        ..party(user)
    }
}

fn not_found(ride_id: &RideId) -> ApiError {
    ApiError::from_status(404, format!("ride {ride_id} not found"))
}
