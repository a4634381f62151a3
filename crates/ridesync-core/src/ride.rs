//! Ride domain types.

use std::fmt;

use ridesync_proto::{PartyInfo, RidePayload, Role, VehicleInfo};

use crate::fare::Quote;

/// Lifecycle status of the session's ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RideStatus {
    /// No ride.
    Idle,
    /// Request (or driver accept) issued, not yet acknowledged.
    Requesting,
    /// Backend knows the ride; waiting for a match.
    Pending,
    /// Rider and driver matched.
    Accepted,
    /// Trip in progress.
    Started,
    /// Trip finished.
    Completed,
    /// Cancelled by either side or lost to another driver.
    Cancelled,
    /// Timed out or rejected by the backend before matching.
    Failed,
}

impl RideStatus {
    /// `Completed`, `Cancelled` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Between a request and a terminal status.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Requesting | Self::Pending | Self::Accepted | Self::Started)
    }

    /// Whether `self -> to` is an edge of the lifecycle graph.
    pub fn can_transition(self, to: Self) -> bool {
        use RideStatus::{Accepted, Cancelled, Completed, Failed, Idle, Pending, Requesting, Started};
        matches!(
            (self, to),
            (Idle, Requesting)
                | (Requesting, Pending)
                | (Pending, Accepted)
                | (Accepted, Started)
                | (Started, Completed)
                | (Requesting | Pending | Accepted | Started, Cancelled)
                | (Requesting | Pending, Failed)
                | (Completed | Cancelled | Failed, Idle)
                | (Requesting, Idle)
        )
    }

    /// Position along the happy path, for forward statuses.
    pub fn stage(self) -> Option<u8> {
        match self {
            Self::Requesting => Some(1),
            Self::Pending => Some(2),
            Self::Accepted => Some(3),
            Self::Started => Some(4),
            Self::Completed => Some(5),
            Self::Idle | Self::Cancelled | Self::Failed => None,
        }
    }

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The matched party: the driver for riders, the rider for drivers.
///
/// Always a complete, owned record. A session either has one or it does not.
#[derive(Debug, Clone, PartialEq)]
pub struct Counterparty {
    /// Backend user id.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Contact number.
    pub phone: Option<String>,
    /// Average rating.
    pub rating: Option<f64>,
    /// Vehicle, for drivers.
    pub vehicle: Option<VehicleInfo>,
}

impl Counterparty {
    /// Counterparty known only by id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), name: None, phone: None, rating: None, vehicle: None }
    }

    /// Build from wire details, using `fallback_id` when the details lack an id.
    ///
    /// Returns `None` when no id is available at all.
    pub fn from_wire(info: Option<&PartyInfo>, fallback_id: Option<&str>) -> Option<Self> {
        let id = info.and_then(|i| i.id.as_deref()).or(fallback_id)?;
        let mut party = Self::new(id);
        if let Some(info) = info {
            party.name.clone_from(&info.name);
            party.phone.clone_from(&info.phone);
            party.rating = info.rating;
            party.vehicle.clone_from(&info.vehicle);
        }
        Some(party)
    }

    /// The other side of `ride` from the perspective of `role`.
    pub fn for_role(role: Role, ride: &RidePayload) -> Option<Self> {
        match role {
            Role::Rider => Self::from_wire(ride.driver.as_ref(), ride.driver_id.as_deref()),
            Role::Driver => Self::from_wire(ride.rider.as_ref(), ride.rider_id.as_deref()),
        }
    }
}

/// Why a ride was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// This session cancelled.
    ByUser,
    /// The other party or the backend cancelled.
    Remote(Option<String>),
    /// Another driver won the ride.
    TakenByOther,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByUser => f.write_str("cancelled by you"),
            Self::Remote(Some(reason)) => write!(f, "cancelled: {reason}"),
            Self::Remote(None) => f.write_str("cancelled by the other party"),
            Self::TakenByOther => f.write_str("taken by another driver"),
        }
    }
}

/// Why a ride failed before matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No match within the matchmaking window.
    Timeout,
    /// The backend rejected or failed the request.
    Server(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("no driver found in time"),
            Self::Server(reason) => write!(f, "request failed: {reason}"),
        }
    }
}

/// Where a numeric value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Client-side estimate.
    Estimate,
    /// Backend-supplied value.
    Authoritative,
}

/// A numeric ride quantity tagged with its origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    /// The value.
    pub value: f64,
    /// Its origin.
    pub origin: Origin,
}

/// Fare, distance and ETA of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Metrics {
    /// Fare.
    pub fare: Option<Quantity>,
    /// Route distance in kilometres.
    pub distance_km: Option<Quantity>,
    /// Minutes to pickup or destination.
    pub eta_minutes: Option<Quantity>,
}

impl Metrics {
    /// Backend-supplied metrics.
    pub fn authoritative(fare: Option<f64>, distance_km: Option<f64>, eta_minutes: Option<f64>) -> Self {
        let tag = |value: Option<f64>| value.map(|value| Quantity { value, origin: Origin::Authoritative });
        Self { fare: tag(fare), distance_km: tag(distance_km), eta_minutes: tag(eta_minutes) }
    }

    /// Metrics carried by a ride payload.
    pub fn from_payload(ride: &RidePayload) -> Self {
        Self::authoritative(ride.fare, ride.distance, ride.eta)
    }

    /// Client-side estimate for a trip.
    pub fn estimate(quote: Quote, distance_km: f64) -> Self {
        let tag = |value: f64| Some(Quantity { value, origin: Origin::Estimate });
        Self { fare: tag(quote.fare), distance_km: tag(distance_km), eta_minutes: tag(quote.eta_minutes) }
    }

    /// Merge `incoming` into `self`.
    ///
    /// Authoritative values always win; estimates only fill gaps or replace
    /// other estimates. Returns whether anything changed.
    pub fn merge(&mut self, incoming: &Self) -> bool {
        let fare = merge_field(&mut self.fare, incoming.fare);
        let distance = merge_field(&mut self.distance_km, incoming.distance_km);
        let eta = merge_field(&mut self.eta_minutes, incoming.eta_minutes);
        fare || distance || eta
    }

    /// Fare value, whatever its origin.
    pub fn fare(&self) -> Option<f64> {
        self.fare.map(|q| q.value)
    }

    /// Distance value, whatever its origin.
    pub fn distance_km(&self) -> Option<f64> {
        self.distance_km.map(|q| q.value)
    }

    /// ETA value, whatever its origin.
    pub fn eta_minutes(&self) -> Option<f64> {
        self.eta_minutes.map(|q| q.value)
    }
}

fn merge_field(current: &mut Option<Quantity>, incoming: Option<Quantity>) -> bool {
    let Some(incoming) = incoming else {
        return false;
    };
    if let Some(existing) = current {
        if existing.origin == Origin::Authoritative && incoming.origin == Origin::Estimate {
            return false;
        }
    }
    let changed = *current != Some(incoming);
    *current = Some(incoming);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authoritative_beats_estimate() {
        let mut metrics = Metrics::estimate(Quote { fare: 100.0, eta_minutes: 10.0 }, 5.0);
        assert!(metrics.merge(&Metrics::authoritative(Some(120.0), None, None)));
        assert_eq!(metrics.fare(), Some(120.0));
        assert_eq!(metrics.distance_km(), Some(5.0));

        let stale = Metrics::estimate(Quote { fare: 90.0, eta_minutes: 9.0 }, 4.0);
        metrics.merge(&stale);
        assert_eq!(metrics.fare(), Some(120.0));
        assert_eq!(metrics.distance_km(), Some(4.0));
    }

    #[test]
    fn identical_merge_reports_no_change() {
        let mut metrics = Metrics::authoritative(Some(1.0), Some(2.0), None);
        assert!(!metrics.merge(&Metrics::authoritative(Some(1.0), Some(2.0), None)));
        assert!(!metrics.merge(&Metrics::default()));
    }

    #[test]
    fn counterparty_needs_an_id() {
        let ride = RidePayload::new("r1");
        assert!(Counterparty::for_role(Role::Rider, &ride).is_none());

        let mut ride = RidePayload::new("r1");
        ride.driver_id = Some("d1".into());
        let party = Counterparty::for_role(Role::Rider, &ride).unwrap();
        assert_eq!(party.id, "d1");
        assert!(party.name.is_none());
    }

    #[test]
    fn counterparty_copies_details() {
        let info = PartyInfo { id: Some("u7".into()), name: Some("Ravi".into()), ..Default::default() };
        let ride = RidePayload::new("r1").with_rider(info);
        let party = Counterparty::for_role(Role::Driver, &ride).unwrap();
        assert_eq!(party.id, "u7");
        assert_eq!(party.name.as_deref(), Some("Ravi"));
    }

    #[test]
    fn edge_table() {
        assert!(RideStatus::Idle.can_transition(RideStatus::Requesting));
        assert!(RideStatus::Started.can_transition(RideStatus::Cancelled));
        assert!(!RideStatus::Idle.can_transition(RideStatus::Started));
        assert!(!RideStatus::Accepted.can_transition(RideStatus::Failed));
        assert!(!RideStatus::Cancelled.can_transition(RideStatus::Accepted));
        assert!(RideStatus::Requesting.can_transition(RideStatus::Idle));
        assert!(!RideStatus::Pending.can_transition(RideStatus::Idle));
    }
}
