//! Ride session state machine.
//!
//! [`RideSession`] is the single mutable aggregate for the logged-in user's
//! ride. Every mutation, whether it came from a REST response, a socket event,
//! a local action or a timeout, goes through [`RideSession::apply`], which
//! runs the same guards in the same order:
//!
//! 1. stale sequence numbers are dropped
//! 2. the input must name the bound ride (or bind one, for `Request`/`Ack`)
//! 3. terminal sessions accept nothing but `Reset`
//! 4. the input must follow an edge of the lifecycle graph
//!
//! ```text
//! Idle ──request──> Requesting ──ack──> Pending ──accept──> Accepted ──start──> Started ──complete──> Completed
//!                        │                 │                    │                  │
//!                        └──────┬──────────┴────────────────────┴──────────────────┴──cancel──> Cancelled
//!                               └──timeout / server error──> Failed
//! Completed | Cancelled | Failed ──reset──> Idle
//! Requesting ──withdraw──> Idle   (driver accept that never reached the backend)
//! ```
//!
//! An input that targets the current status is idempotent: it refreshes
//! metrics but never re-enters the status. Once a ride reaches a terminal
//! status its id is retired for the lifetime of the session object, so no
//! later update can revive it.

use std::collections::HashSet;

use ridesync_proto::{GeoPoint, Location, RideId, RidePayload, Role};
use tracing::debug;

use crate::{
    error::Conflict,
    fare::VehicleClass,
    ride::{CancelReason, Counterparty, FailureReason, Metrics, RideStatus},
};

/// Where an input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Local action or timer.
    Local,
    /// REST response.
    Rest,
    /// Socket event, with the backend sequence number if it carried one.
    Socket {
        /// Backend sequence number.
        seq: Option<u64>,
    },
}

impl Source {
    /// Socket source without a sequence number.
    pub const SOCKET: Self = Self::Socket { seq: None };

    fn seq(self) -> Option<u64> {
        match self {
            Self::Socket { seq } => seq,
            Self::Local | Self::Rest => None,
        }
    }
}

/// Ride facts carried by backend payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideFacts {
    /// Fare, distance and ETA.
    pub metrics: Metrics,
    /// Pickup point.
    pub pickup: Option<Location>,
    /// Drop-off point.
    pub dropoff: Option<Location>,
}

impl RideFacts {
    /// Extract the facts from a ride payload.
    pub fn from_payload(ride: &RidePayload) -> Self {
        Self {
            metrics: Metrics::from_payload(ride),
            pickup: ride.pickup_location.clone(),
            dropoff: ride.dropoff_location.clone(),
        }
    }
}

/// An input to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum RideInput {
    /// Request issued. Riders have no ride id yet; drivers accepting an
    /// offer already know it.
    Request {
        /// Ride id, for drivers.
        ride_id: Option<RideId>,
        /// Pickup point.
        pickup: Option<Location>,
        /// Drop-off point.
        dropoff: Option<Location>,
        /// Vehicle class.
        vehicle: Option<VehicleClass>,
        /// Initial metrics, usually estimates.
        metrics: Metrics,
    },
    /// Backend acknowledged the ride.
    Ack {
        /// Ride id assigned by the backend.
        ride_id: RideId,
        /// Facts from the acknowledgement.
        facts: RideFacts,
    },
    /// Rider and driver matched.
    Accept {
        /// Ride id.
        ride_id: RideId,
        /// Matched party, if the update carried one.
        counterparty: Option<Counterparty>,
        /// Facts from the update.
        facts: RideFacts,
    },
    /// Trip started.
    Start {
        /// Ride id.
        ride_id: RideId,
        /// Facts from the update.
        facts: RideFacts,
    },
    /// Trip completed.
    Complete {
        /// Ride id.
        ride_id: RideId,
        /// Facts from the update.
        facts: RideFacts,
    },
    /// Ride cancelled.
    Cancel {
        /// Ride id, absent for a local cancel before acknowledgement.
        ride_id: Option<RideId>,
        /// Why.
        reason: CancelReason,
    },
    /// Ride failed before matching.
    Fail {
        /// Ride id, if known.
        ride_id: Option<RideId>,
        /// Why.
        reason: FailureReason,
    },
    /// Non-structural refresh of the current status.
    Refresh {
        /// Ride id.
        ride_id: RideId,
        /// Facts from the update.
        facts: RideFacts,
        /// Latest driver position.
        driver_location: Option<GeoPoint>,
    },
    /// Driver accept that the backend never saw. Returns to `Idle` without
    /// retiring the ride, so the offer can be accepted again.
    Withdraw {
        /// Ride the accept was for.
        ride_id: RideId,
    },
    /// Clear a terminal session back to idle.
    Reset,
}

impl RideInput {
    /// Short name, for logs and conflicts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Ack { .. } => "ack",
            Self::Accept { .. } => "accept",
            Self::Start { .. } => "start",
            Self::Complete { .. } => "complete",
            Self::Cancel { .. } => "cancel",
            Self::Fail { .. } => "fail",
            Self::Refresh { .. } => "refresh",
            Self::Withdraw { .. } => "withdraw",
            Self::Reset => "reset",
        }
    }

    /// Ride the input refers to.
    pub fn ride_id(&self) -> Option<&RideId> {
        match self {
            Self::Request { ride_id, .. }
            | Self::Cancel { ride_id, .. }
            | Self::Fail { ride_id, .. } => ride_id.as_ref(),
            Self::Ack { ride_id, .. }
            | Self::Accept { ride_id, .. }
            | Self::Start { ride_id, .. }
            | Self::Complete { ride_id, .. }
            | Self::Refresh { ride_id, .. }
            | Self::Withdraw { ride_id } => Some(ride_id),
            Self::Reset => None,
        }
    }

    /// Status the input moves the session to, `None` for refreshes.
    fn target(&self) -> Option<RideStatus> {
        match self {
            Self::Request { .. } => Some(RideStatus::Requesting),
            Self::Ack { .. } => Some(RideStatus::Pending),
            Self::Accept { .. } => Some(RideStatus::Accepted),
            Self::Start { .. } => Some(RideStatus::Started),
            Self::Complete { .. } => Some(RideStatus::Completed),
            Self::Cancel { .. } => Some(RideStatus::Cancelled),
            Self::Fail { .. } => Some(RideStatus::Failed),
            Self::Withdraw { .. } | Self::Reset => Some(RideStatus::Idle),
            Self::Refresh { .. } => None,
        }
    }

    fn may_bind(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Ack { .. })
    }
}

/// Result of applying an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Status changed.
    Transitioned {
        /// Previous status.
        from: RideStatus,
        /// New status.
        to: RideStatus,
    },
    /// Status unchanged, other fields updated.
    Refreshed,
    /// Nothing changed.
    Unchanged,
    /// Input rejected; session untouched.
    Dropped(Conflict),
}

impl Outcome {
    /// Whether the session changed.
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Transitioned { .. } | Self::Refreshed)
    }
}

/// Read-only copy of the session for rendering and comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Session role.
    pub role: Role,
    /// Bound ride.
    pub ride_id: Option<RideId>,
    /// Current status.
    pub status: RideStatus,
    /// Pickup point.
    pub pickup: Option<Location>,
    /// Drop-off point.
    pub dropoff: Option<Location>,
    /// Vehicle class.
    pub vehicle: Option<VehicleClass>,
    /// Matched party.
    pub counterparty: Option<Counterparty>,
    /// Fare, distance and ETA.
    pub metrics: Metrics,
    /// Last known driver position.
    pub driver_location: Option<GeoPoint>,
    /// Set once cancelled.
    pub cancel_reason: Option<CancelReason>,
    /// Set once failed.
    pub failure: Option<FailureReason>,
    /// Highest applied socket sequence number.
    pub last_event_seq: Option<u64>,
}

/// The ride session state machine.
#[derive(Debug, Clone)]
pub struct RideSession {
    role: Role,
    ride_id: Option<RideId>,
    status: RideStatus,
    pickup: Option<Location>,
    dropoff: Option<Location>,
    vehicle: Option<VehicleClass>,
    counterparty: Option<Counterparty>,
    metrics: Metrics,
    driver_location: Option<GeoPoint>,
    cancel_reason: Option<CancelReason>,
    failure: Option<FailureReason>,
    last_event_seq: Option<u64>,
    retired: HashSet<RideId>,
}

impl RideSession {
    /// Empty session at `Idle`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ride_id: None,
            status: RideStatus::Idle,
            pickup: None,
            dropoff: None,
            vehicle: None,
            counterparty: None,
            metrics: Metrics::default(),
            driver_location: None,
            cancel_reason: None,
            failure: None,
            last_event_seq: None,
            retired: HashSet::new(),
        }
    }

    /// Session role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current status.
    pub fn status(&self) -> RideStatus {
        self.status
    }

    /// Bound ride.
    pub fn ride_id(&self) -> Option<&RideId> {
        self.ride_id.as_ref()
    }

    /// Matched party.
    pub fn counterparty(&self) -> Option<&Counterparty> {
        self.counterparty.as_ref()
    }

    /// Fare, distance and ETA.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Last known driver position.
    pub fn driver_location(&self) -> Option<GeoPoint> {
        self.driver_location
    }

    /// Highest applied socket sequence number.
    pub fn last_event_seq(&self) -> Option<u64> {
        self.last_event_seq
    }

    /// Whether `ride_id` already reached a terminal status.
    pub fn is_retired(&self, ride_id: &RideId) -> bool {
        self.retired.contains(ride_id)
    }

    /// Copy of the observable state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            role: self.role,
            ride_id: self.ride_id.clone(),
            status: self.status,
            pickup: self.pickup.clone(),
            dropoff: self.dropoff.clone(),
            vehicle: self.vehicle,
            counterparty: self.counterparty.clone(),
            metrics: self.metrics,
            driver_location: self.driver_location,
            cancel_reason: self.cancel_reason.clone(),
            failure: self.failure.clone(),
            last_event_seq: self.last_event_seq,
        }
    }

    /// Apply one input.
    ///
    /// Dropped inputs leave the session untouched, including its sequence
    /// marker.
    pub fn apply(&mut self, input: RideInput, source: Source) -> Outcome {
        let seq = source.seq();
        let name = input.name();
        let outcome = self.apply_guarded(input, source);

        match &outcome {
            Outcome::Dropped(conflict) => {
                debug!(input = name, status = %self.status, %conflict, "input dropped");
            },
            applied => {
                if let Some(seq) = seq {
                    self.last_event_seq = Some(self.last_event_seq.map_or(seq, |last| last.max(seq)));
                }
                if let Outcome::Transitioned { from, to } = applied {
                    debug!(input = name, %from, %to, ride_id = ?self.ride_id, "ride transition");
                }
            },
        }
        outcome
    }

    fn apply_guarded(&mut self, input: RideInput, source: Source) -> Outcome {
        if let RideInput::Reset = input {
            return self.reset();
        }

        if let (Some(seq), Some(last)) = (source.seq(), self.last_event_seq) {
            if seq <= last {
                return Outcome::Dropped(Conflict::Stale { seq, last });
            }
        }

        if let Some(conflict) = self.check_identity(&input) {
            return Outcome::Dropped(conflict);
        }

        if self.status.is_terminal() {
            return Outcome::Dropped(Conflict::AfterTerminal {
                input: input.name(),
                status: self.status,
            });
        }

        let Some(target) = input.target() else {
            return match input {
                RideInput::Refresh { facts, driver_location, .. } => {
                    self.refresh(&facts, driver_location)
                },
                _ => Outcome::Unchanged,
            };
        };

        if target == self.status {
            return match &input {
                RideInput::Ack { facts, .. }
                | RideInput::Accept { facts, .. }
                | RideInput::Start { facts, .. } => self.refresh(facts, None),
                _ => Outcome::Unchanged,
            };
        }

        if !self.status.can_transition(target) {
            let behind = matches!(
                (target.stage(), self.status.stage()),
                (Some(to), Some(at)) if to < at
            );
            return Outcome::Dropped(if behind {
                Conflict::Outdated { input: input.name(), status: self.status }
            } else {
                Conflict::IllegalTransition { input: input.name(), from: self.status }
            });
        }

        self.enter(input, target, source)
    }

    fn check_identity(&self, input: &RideInput) -> Option<Conflict> {
        let incoming = input.ride_id()?;
        match &self.ride_id {
            Some(current) if current != incoming => Some(Conflict::RideMismatch {
                input: input.name(),
                expected: current.clone(),
                received: incoming.clone(),
            }),
            Some(_) => None,
            None if self.retired.contains(incoming) => {
                Some(Conflict::Retired { input: input.name(), ride_id: incoming.clone() })
            },
            None if !input.may_bind() => {
                Some(Conflict::Unbound { input: input.name(), received: incoming.clone() })
            },
            None => None,
        }
    }

    /// Perform a legal transition. Guards have already passed.
    fn enter(&mut self, input: RideInput, to: RideStatus, source: Source) -> Outcome {
        let name = input.name();
        let from = self.status;
        match input {
            RideInput::Request { ride_id, pickup, dropoff, vehicle, metrics } => {
                let needs_id = self.role == Role::Driver;
                if ride_id.is_some() != needs_id {
                    return Outcome::Dropped(Conflict::RoleMismatch { input: name, role: self.role });
                }
                self.ride_id = ride_id;
                self.pickup = pickup;
                self.dropoff = dropoff;
                self.vehicle = vehicle;
                self.metrics.merge(&metrics);
            },
            RideInput::Ack { ride_id, facts } => {
                self.ride_id.get_or_insert(ride_id);
                self.absorb(&facts);
            },
            RideInput::Accept { ride_id, counterparty, facts } => {
                // Drivers match through their own accept response, never a push.
                if self.role == Role::Driver && matches!(source, Source::Socket { .. }) {
                    return Outcome::Dropped(Conflict::RoleMismatch { input: name, role: self.role });
                }
                let Some(counterparty) = counterparty else {
                    return Outcome::Dropped(Conflict::IncompleteCounterparty {
                        input: name,
                        ride_id,
                    });
                };
                self.counterparty = Some(counterparty);
                self.absorb(&facts);
            },
            RideInput::Start { facts, .. } | RideInput::Complete { facts, .. } => {
                self.absorb(&facts);
            },
            RideInput::Cancel { reason, .. } => {
                self.cancel_reason = Some(reason);
            },
            RideInput::Fail { reason, .. } => {
                self.failure = Some(reason);
            },
            RideInput::Withdraw { .. } => {
                if self.role != Role::Driver || source != Source::Local {
                    return Outcome::Dropped(Conflict::RoleMismatch { input: name, role: self.role });
                }
                self.clear();
            },
            RideInput::Refresh { .. } | RideInput::Reset => return Outcome::Unchanged,
        }

        self.status = to;
        if to.is_terminal() {
            if let Some(ride_id) = &self.ride_id {
                self.retired.insert(ride_id.clone());
            }
        }
        Outcome::Transitioned { from, to }
    }

    fn refresh(&mut self, facts: &RideFacts, driver_location: Option<GeoPoint>) -> Outcome {
        let mut changed = self.absorb(facts);
        if let Some(point) = driver_location {
            changed |= self.driver_location != Some(point);
            self.driver_location = Some(point);
        }
        if changed { Outcome::Refreshed } else { Outcome::Unchanged }
    }

    /// Merge metrics and fill in route points that are still unset.
    fn absorb(&mut self, facts: &RideFacts) -> bool {
        let mut changed = self.metrics.merge(&facts.metrics);
        if self.pickup.is_none() && facts.pickup.is_some() {
            self.pickup.clone_from(&facts.pickup);
            changed = true;
        }
        if self.dropoff.is_none() && facts.dropoff.is_some() {
            self.dropoff.clone_from(&facts.dropoff);
            changed = true;
        }
        changed
    }

    fn reset(&mut self) -> Outcome {
        match self.status {
            RideStatus::Idle => Outcome::Unchanged,
            status if status.is_terminal() => {
                self.clear();
                Outcome::Transitioned { from: status, to: RideStatus::Idle }
            },
            status => Outcome::Dropped(Conflict::IllegalTransition { input: "reset", from: status }),
        }
    }

    /// Back to a fresh `Idle` session, keeping retired ids and the sequence
    /// marker.
    fn clear(&mut self) {
        let retired = std::mem::take(&mut self.retired);
        let last_event_seq = self.last_event_seq;
        *self = Self::new(self.role);
        self.retired = retired;
        self.last_event_seq = last_event_seq;
    }
}
