//! Reconciliation and action layer.
//!
//! [`Client`] owns the [`RideSession`], the [`SimulationClock`] and the
//! driver [`OfferBook`], and is the only code that mutates them. REST
//! responses, socket events, connectivity changes and timer ticks all enter
//! through [`Client::handle`] and are applied through the session's guarded
//! apply path, one at a time.
//!
//! # Architecture: Action-Based State Machine
//!
//! - `handle(ClientEvent) -> Result<Vec<ClientAction>, ClientError>`
//! - REST calls are requested as [`ClientAction::Api`]; their results come
//!   back later as [`ClientEvent::ApiResponse`], interleaved arbitrarily with
//!   socket events
//! - Errors returned from `handle` are local precondition failures; nothing
//!   was sent
//!
//! # Ordering
//!
//! A REST snapshot is merged as a chain of inputs along legal edges, so a
//! response that is ahead of the socket catches the session up, and one that
//! is behind is skipped. Terminal statuses retire the ride, so whichever of
//! cancellation and acceptance is applied first, cancellation wins.

use std::{
    collections::{BTreeMap, VecDeque},
    time::{Duration, Instant},
};

use ridesync_core::{
    CancelReason, ClockConfig, ConnectionState, Counterparty, Environment, FailureReason,
    FareEstimator, FareTable, Metrics, Outcome, Progress, RideFacts, RideInput, RideSession,
    RideStatus, Routed, SessionSnapshot, SimulationClock, Source, VehicleClass, haversine_km,
};
use ridesync_proto::{
    DomainEvent, GeoPoint, Location, OutboundEvent, RideId, RidePayload, RideRequestBody, Role,
    WireStatus,
};
use tracing::{debug, info, warn};

use crate::{
    action::ClientAction,
    api::{ApiCall, ApiError, ApiReply, ApiRequest, RequestId},
    error::ClientError,
    event::ClientEvent,
    offers::OfferBook,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request may wait for a match before failing locally.
    pub match_timeout: Duration,
    /// Resync interval while a ride is active.
    pub poll_interval: Duration,
    /// Socket events buffered while a request is unacknowledged.
    pub max_deferred: usize,
    /// Offers kept in the driver's offer book.
    pub offer_capacity: usize,
    /// Simulation clock settings.
    pub clock: ClockConfig,
    /// Tariffs for request estimates.
    pub fares: FareTable,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(10),
            max_deferred: 32,
            offer_capacity: 20,
            clock: ClockConfig::default(),
            fares: FareTable::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Request,
    Accept,
    Start,
    Complete,
    Cancel,
    Resync,
    FetchOffers,
    /// Best-effort cancel of a ride nobody is waiting for anymore.
    Abandon,
}

impl ActionKind {
    fn name(self) -> &'static str {
        match self {
            Self::Request => "request_ride",
            Self::Accept => "accept_ride",
            Self::Start => "start_ride",
            Self::Complete => "complete_ride",
            Self::Cancel => "cancel_ride",
            Self::Resync => "resync",
            Self::FetchOffers => "fetch_offers",
            Self::Abandon => "abandon_ride",
        }
    }
}

#[derive(Debug, Clone)]
struct Inflight {
    kind: ActionKind,
    call: ApiCall,
    /// Response no longer wanted; clean up instead of applying it.
    abandoned: bool,
    /// Offer being accepted, to fill rider details the response may lack.
    offer: Option<RidePayload>,
}

/// Ride client state machine.
#[derive(Debug)]
pub struct Client<E: Environment> {
    env: E,
    config: ClientConfig,
    session: RideSession,
    clock: SimulationClock,
    offers: OfferBook,
    inflight: BTreeMap<RequestId, Inflight>,
    next_request: u64,
    deferred: VecDeque<Routed>,
    connection: ConnectionState,
    requested_at: Option<Instant>,
    last_poll: Option<Instant>,
    location: Option<GeoPoint>,
}

impl<E: Environment> Client<E> {
    /// Idle client for `role`.
    pub fn new(env: E, role: Role, config: ClientConfig) -> Self {
        Self {
            session: RideSession::new(role),
            clock: SimulationClock::new(config.clock.clone()),
            offers: OfferBook::new(config.offer_capacity),
            env,
            config,
            inflight: BTreeMap::new(),
            next_request: 1,
            deferred: VecDeque::new(),
            connection: ConnectionState::Disconnected,
            requested_at: None,
            last_poll: None,
            location: None,
        }
    }

    /// Session role.
    pub fn role(&self) -> Role {
        self.session.role()
    }

    /// The ride session.
    pub fn session(&self) -> &RideSession {
        &self.session
    }

    /// Copy of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Driver offers.
    pub fn offers(&self) -> &OfferBook {
        &self.offers
    }

    /// Simulated progress, while the clock runs.
    pub fn progress(&self) -> Option<Progress> {
        self.clock.progress()
    }

    /// Whether the simulation clock is running.
    pub fn clock_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Last connectivity reported to the client.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Last geolocation fix.
    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }

    /// REST calls awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inflight.len()
    }

    /// Socket events buffered until the ride id is known.
    pub fn deferred_events(&self) -> usize {
        self.deferred.len()
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// User actions fail with [`ClientError`] when the session does not
    /// permit them. No network call is requested in that case.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        match event {
            ClientEvent::RequestRide { pickup, dropoff, vehicle } => {
                self.request_ride(pickup, dropoff, vehicle, now)
            },
            ClientEvent::AcceptRide { ride_id } => self.accept_ride(ride_id, now),
            ClientEvent::StartRide => self.start_ride(),
            ClientEvent::CompleteRide => self.complete_ride(),
            ClientEvent::CancelRide => self.cancel_ride(now),
            ClientEvent::RejectOffer { ride_id } => self.reject_offer(&ride_id),
            ClientEvent::Reset => self.reset(now),
            ClientEvent::ApiResponse { request_id, result } => {
                Ok(self.on_api_response(request_id, result, now))
            },
            ClientEvent::Socket(routed) => {
                let mut actions = Vec::new();
                self.on_socket(routed, now, &mut actions);
                Ok(actions)
            },
            ClientEvent::ConnectionChanged(state) => Ok(self.on_connection(state, now)),
            ClientEvent::LocationChanged(point) => Ok(self.on_location(point)),
            ClientEvent::LocationUnavailable { reason } => {
                warn!(%reason, "geolocation unavailable");
                Ok(vec![ClientAction::LocationUnavailable { reason }])
            },
            ClientEvent::Tick => Ok(self.on_tick(now)),
        }
    }

    fn request_ride(
        &mut self,
        pickup: Location,
        dropoff: Location,
        vehicle: VehicleClass,
        now: Instant,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.require("request_ride", Some(Role::Rider), &[RideStatus::Idle])?;
        self.ensure_not_inflight(ActionKind::Request)?;

        let distance_km = haversine_km(pickup.point(), dropoff.point());
        let quote = self.config.fares.quote(distance_km, vehicle);

        let mut actions = Vec::new();
        self.apply(
            RideInput::Request {
                ride_id: None,
                pickup: Some(pickup.clone()),
                dropoff: Some(dropoff.clone()),
                vehicle: Some(vehicle),
                metrics: Metrics::estimate(quote, distance_km),
            },
            Source::Local,
            now,
            &mut actions,
        );
        self.requested_at = Some(now);

        let body = RideRequestBody {
            pickup_location: pickup,
            dropoff_location: dropoff,
            vehicle_type: vehicle.as_str().to_string(),
            fare: Some(quote.fare),
            distance: Some((distance_km * 100.0).round() / 100.0),
        };
        info!(%vehicle, distance_km, fare = quote.fare, "requesting ride");
        actions.push(self.issue(ActionKind::Request, ApiCall::RequestRide { body }, None));
        Ok(actions)
    }

    fn accept_ride(
        &mut self,
        ride_id: RideId,
        now: Instant,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.require("accept_ride", Some(Role::Driver), &[RideStatus::Idle])?;
        self.ensure_not_inflight(ActionKind::Accept)?;
        let offer =
            self.offers.remove(&ride_id).ok_or_else(|| ClientError::UnknownOffer(ride_id.clone()))?;

        let facts = RideFacts::from_payload(&offer);
        let vehicle = offer.vehicle_type.as_deref().and_then(|v| v.parse().ok());

        let mut actions = vec![ClientAction::OfferWithdrawn(ride_id.clone())];
        self.apply(
            RideInput::Request {
                ride_id: Some(ride_id.clone()),
                pickup: facts.pickup,
                dropoff: facts.dropoff,
                vehicle,
                metrics: facts.metrics,
            },
            Source::Local,
            now,
            &mut actions,
        );
        self.requested_at = Some(now);

        info!(%ride_id, "accepting ride");
        let call = ApiCall::AcceptRide { ride_id, location: self.location };
        actions.push(self.issue(ActionKind::Accept, call, Some(offer)));
        Ok(actions)
    }

    fn start_ride(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        self.require("start_ride", Some(Role::Driver), &[RideStatus::Accepted])?;
        self.ensure_not_inflight(ActionKind::Start)?;
        let ride_id = self.bound_ride("start_ride")?;
        Ok(vec![self.issue(ActionKind::Start, ApiCall::StartRide { ride_id }, None)])
    }

    fn complete_ride(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        self.require("complete_ride", Some(Role::Driver), &[RideStatus::Started])?;
        self.ensure_not_inflight(ActionKind::Complete)?;
        let ride_id = self.bound_ride("complete_ride")?;
        let call = ApiCall::CompleteRide { ride_id, dropoff: self.location };
        Ok(vec![self.issue(ActionKind::Complete, call, None)])
    }

    fn cancel_ride(&mut self, now: Instant) -> Result<Vec<ClientAction>, ClientError> {
        self.require("cancel_ride", None, &[
            RideStatus::Requesting,
            RideStatus::Pending,
            RideStatus::Accepted,
            RideStatus::Started,
        ])?;
        self.ensure_not_inflight(ActionKind::Cancel)?;

        let mut actions = Vec::new();
        match self.session.ride_id().cloned() {
            Some(ride_id) => {
                info!(%ride_id, "cancelling ride");
                actions.push(self.issue(ActionKind::Cancel, ApiCall::CancelRide { ride_id }, None));
            },
            None => {
                // Not acknowledged yet: cancel now, clean up when the ack lands.
                info!("cancelling unacknowledged request");
                self.abandon(ActionKind::Request);
                self.apply(
                    RideInput::Cancel { ride_id: None, reason: CancelReason::ByUser },
                    Source::Local,
                    now,
                    &mut actions,
                );
            },
        }
        Ok(actions)
    }

    fn reject_offer(&mut self, ride_id: &RideId) -> Result<Vec<ClientAction>, ClientError> {
        if self.session.role() != Role::Driver {
            return Err(self.invalid("reject_offer"));
        }
        match self.offers.remove(ride_id) {
            Some(_) => {
                debug!(%ride_id, "offer rejected");
                Ok(vec![ClientAction::OfferWithdrawn(ride_id.clone())])
            },
            None => Err(ClientError::UnknownOffer(ride_id.clone())),
        }
    }

    fn reset(&mut self, now: Instant) -> Result<Vec<ClientAction>, ClientError> {
        let status = self.session.status();
        if status == RideStatus::Idle {
            return Ok(Vec::new());
        }
        if !status.is_terminal() {
            return Err(self.invalid("reset"));
        }
        let mut actions = Vec::new();
        self.apply(RideInput::Reset, Source::Local, now, &mut actions);
        Ok(actions)
    }

    fn on_api_response(
        &mut self,
        request_id: RequestId,
        result: Result<ApiReply, ApiError>,
        now: Instant,
    ) -> Vec<ClientAction> {
        let Some(inflight) = self.inflight.remove(&request_id) else {
            debug!(request = %request_id, "response for unknown request");
            return Vec::new();
        };
        let kind = inflight.kind;
        if let Err(err) = &result {
            warn!(request = %request_id, action = kind.name(), error = %err, "api call failed");
        }

        let mut actions = Vec::new();
        match kind {
            ActionKind::Request => self.on_request_response(&inflight, result, now, &mut actions),
            ActionKind::Accept => self.on_accept_response(inflight, result, now, &mut actions),
            ActionKind::Start | ActionKind::Complete => match result {
                Ok(reply) => {
                    if let Some(ride) = reply_ride(&inflight.call, reply) {
                        let ride_id = ride.id.clone();
                        self.merge_snapshot(ride, Source::Rest, now, &mut actions);
                        if kind == ActionKind::Start && self.session.status() == RideStatus::Started {
                            self.mirror(OutboundEvent::RideStart { ride_id }, &mut actions);
                        }
                    }
                },
                Err(err) => actions.push(failed(kind, &err)),
            },
            ActionKind::Cancel => match result {
                Ok(_) => {
                    let ride_id = inflight.call.ride_id().cloned();
                    if !self.session.status().is_terminal() {
                        self.apply(
                            RideInput::Cancel { ride_id: ride_id.clone(), reason: CancelReason::ByUser },
                            Source::Rest,
                            now,
                            &mut actions,
                        );
                    }
                    if let Some(ride_id) = ride_id {
                        self.mirror(OutboundEvent::RideCancel { ride_id }, &mut actions);
                    }
                },
                Err(err) => actions.push(failed(kind, &err)),
            },
            ActionKind::Resync => {
                if let Ok(ApiReply::Ride(ride)) = result {
                    if self.is_own(&ride.id) && !self.session.status().is_terminal() {
                        self.merge_snapshot(ride, Source::Rest, now, &mut actions);
                    } else {
                        debug!(ride_id = %ride.id, "discarding resync for inactive ride");
                    }
                }
            },
            ActionKind::FetchOffers => {
                if let Ok(ApiReply::Offers(offers)) = result {
                    for offer in offers {
                        self.on_offer(offer, &mut actions);
                    }
                }
            },
            ActionKind::Abandon => {
                debug!(ok = result.is_ok(), "abandoned ride cleanup finished");
            },
        }
        actions
    }

    fn on_request_response(
        &mut self,
        inflight: &Inflight,
        result: Result<ApiReply, ApiError>,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        match result {
            Ok(ApiReply::Ride(ride)) if inflight.abandoned => {
                info!(ride_id = %ride.id, "cancelling ride created after local cancel");
                let call = ApiCall::CancelRide { ride_id: ride.id };
                actions.push(self.issue(ActionKind::Abandon, call, None));
            },
            Ok(ApiReply::Ride(ride)) => self.merge_snapshot(ride, Source::Rest, now, actions),
            Ok(_) | Err(_) if inflight.abandoned => {},
            Ok(_) => {
                let err = ApiError::Malformed("request_ride response has no ride".to_string());
                self.fail_request(None, &err, now, actions);
            },
            Err(err) => self.fail_request(None, &err, now, actions),
        }
    }

    fn on_accept_response(
        &mut self,
        inflight: Inflight,
        result: Result<ApiReply, ApiError>,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        let ride_id = inflight.call.ride_id().cloned();
        if inflight.abandoned {
            debug!(?ride_id, "ignoring accept response after timeout");
            return;
        }
        match result {
            Ok(reply) => {
                let Some(mut ride) = reply_ride(&inflight.call, reply) else {
                    return;
                };
                if ride.rider.is_none() && ride.rider_id.is_none() {
                    if let Some(offer) = &inflight.offer {
                        ride.rider.clone_from(&offer.rider);
                        ride.rider_id.clone_from(&offer.rider_id);
                    }
                }
                if ride.ride_status.is_none() {
                    ride.ride_status = Some(WireStatus::Accepted);
                }
                let accepted = ride.id.clone();
                self.merge_snapshot(ride, Source::Rest, now, actions);
                if self.session.status() == RideStatus::Accepted && self.is_own(&accepted) {
                    self.mirror(OutboundEvent::accept(accepted, self.location), actions);
                }
            },
            Err(ApiError::Conflict) => {
                info!(?ride_id, "ride taken by another driver");
                self.apply(
                    RideInput::Cancel { ride_id, reason: CancelReason::TakenByOther },
                    Source::Rest,
                    now,
                    actions,
                );
                actions.push(failed(ActionKind::Accept, &ApiError::Conflict));
            },
            Err(err) if err.is_transient() => self.withdraw_accept(inflight, &err, now, actions),
            Err(err) => self.fail_request(ride_id, &err, now, actions),
        }
    }

    /// Undo an accept the backend may never have seen: back to `Idle` with
    /// the offer restored, so the driver can retry.
    fn withdraw_accept(
        &mut self,
        inflight: Inflight,
        err: &ApiError,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        let held = inflight.call.ride_id().filter(|id| self.is_own(id)).cloned();
        if let (Some(ride_id), RideStatus::Requesting) = (held, self.session.status()) {
            warn!(%ride_id, error = %err, "accept failed in transit, restoring offer");
            self.apply(RideInput::Withdraw { ride_id }, Source::Local, now, actions);
            if let Some(offer) = inflight.offer {
                self.on_offer(offer, actions);
            }
        }
        actions.push(failed(ActionKind::Accept, err));
    }

    fn fail_request(
        &mut self,
        ride_id: Option<RideId>,
        err: &ApiError,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        let kind = if self.role() == Role::Driver { ActionKind::Accept } else { ActionKind::Request };
        self.apply(
            RideInput::Fail { ride_id, reason: FailureReason::Server(err.to_string()) },
            Source::Rest,
            now,
            actions,
        );
        actions.push(failed(kind, err));
    }

    fn on_socket(&mut self, routed: Routed, now: Instant, actions: &mut Vec<ClientAction>) {
        if self.should_defer(&routed) {
            if self.deferred.len() >= self.config.max_deferred {
                if let Some(dropped) = self.deferred.pop_front() {
                    warn!(receipt = dropped.receipt, "deferred buffer full, dropping oldest");
                }
            }
            debug!(receipt = routed.receipt, "deferring event until ride id is known");
            self.deferred.push_back(routed);
            return;
        }

        let source = Source::Socket { seq: routed.seq };
        let role = self.session.role();
        match routed.event {
            DomainEvent::NewRideAvailable(offer) => self.on_offer(offer, actions),
            DomainEvent::RideTaken(ride) => {
                let status = self.session.status();
                if !self.is_own(&ride.id) {
                    self.withdraw_offer(&ride.id, actions);
                } else if role == Role::Driver
                    && matches!(status, RideStatus::Requesting | RideStatus::Pending)
                {
                    self.apply(
                        RideInput::Cancel {
                            ride_id: Some(ride.id),
                            reason: CancelReason::TakenByOther,
                        },
                        source,
                        now,
                        actions,
                    );
                } else {
                    // Broadcast for the ride we won.
                    debug!(ride_id = %ride.id, %status, "ignoring ride:taken for own ride");
                }
            },
            DomainEvent::DriverLocationUpdate(location) => {
                if role != Role::Rider {
                    return;
                }
                let Some(ride_id) = location.ride_id.clone().or_else(|| self.session.ride_id().cloned())
                else {
                    debug!("driver location without a ride");
                    return;
                };
                let input = RideInput::Refresh {
                    ride_id,
                    facts: RideFacts::default(),
                    driver_location: Some(location.point()),
                };
                self.apply(input, source, now, actions);
            },
            DomainEvent::Error { message } => {
                warn!(%message, "server error event");
                actions.push(ClientAction::ServerError { message });
            },
            DomainEvent::Registered { user_id } => {
                info!(?user_id, "socket registered");
            },
            DomainEvent::RideAccepted(ride)
            | DomainEvent::RideStarted(ride)
            | DomainEvent::RideCompleted(ride)
            | DomainEvent::RideCancelled(ride)
                if role == Role::Driver && !self.is_own(&ride.id) && self.offers.contains(&ride.id) =>
            {
                // Someone else's ride moved on; the offer is gone.
                self.withdraw_offer(&ride.id, actions);
            },
            DomainEvent::RideAccepted(ride) => {
                let input = RideInput::Accept {
                    ride_id: ride.id.clone(),
                    counterparty: Counterparty::for_role(role, &ride),
                    facts: RideFacts::from_payload(&ride),
                };
                self.apply_socket(input, source, now, actions);
            },
            DomainEvent::RideStarted(ride) => {
                let facts = RideFacts::from_payload(&ride);
                self.apply_socket(RideInput::Start { ride_id: ride.id, facts }, source, now, actions);
            },
            DomainEvent::RideCompleted(ride) => {
                let facts = RideFacts::from_payload(&ride);
                let input = RideInput::Complete { ride_id: ride.id, facts };
                self.apply_socket(input, source, now, actions);
            },
            DomainEvent::RideCancelled(ride) => {
                let input = RideInput::Cancel {
                    ride_id: Some(ride.id),
                    reason: CancelReason::Remote(ride.reason),
                };
                self.apply_socket(input, source, now, actions);
            },
        }
    }

    /// Apply a lifecycle event; resync if it shows we missed something.
    fn apply_socket(
        &mut self,
        input: RideInput,
        source: Source,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        if let Outcome::Dropped(conflict) = self.apply(input, source, now, actions) {
            if conflict.suggests_resync() {
                self.resync(now, actions);
            }
        }
    }

    fn should_defer(&self, routed: &Routed) -> bool {
        let lifecycle = matches!(
            routed.event,
            DomainEvent::RideAccepted(_)
                | DomainEvent::RideStarted(_)
                | DomainEvent::RideCompleted(_)
                | DomainEvent::RideCancelled(_)
                | DomainEvent::DriverLocationUpdate(_)
        );
        lifecycle
            && routed.event.ride_id().is_some()
            && self.session.role() == Role::Rider
            && self.session.status() == RideStatus::Requesting
            && self.session.ride_id().is_none()
    }

    fn on_offer(&mut self, offer: RidePayload, actions: &mut Vec<ClientAction>) {
        if self.session.role() != Role::Driver {
            return;
        }
        if self.session.is_retired(&offer.id) || self.is_own(&offer.id) {
            return;
        }
        if offer.ride_status.is_some_and(|status| status != WireStatus::Pending) {
            debug!(ride_id = %offer.id, "ignoring offer that is no longer open");
            return;
        }

        let idle = self.session.status() == RideStatus::Idle;
        let (new, evicted) = self.offers.insert(offer.clone(), idle);
        if let Some(evicted) = evicted {
            actions.push(ClientAction::OfferWithdrawn(evicted.id));
        }
        if !idle {
            debug!(ride_id = %offer.id, "queued offer while a ride is active");
        } else if new {
            info!(ride_id = %offer.id, fare = ?offer.fare, "new ride offer");
            actions.push(ClientAction::OfferAvailable(offer));
        }
    }

    fn withdraw_offer(&mut self, ride_id: &RideId, actions: &mut Vec<ClientAction>) {
        if self.offers.remove(ride_id).is_some() {
            debug!(%ride_id, "offer withdrawn");
            actions.push(ClientAction::OfferWithdrawn(ride_id.clone()));
        }
    }

    fn on_connection(&mut self, state: ConnectionState, now: Instant) -> Vec<ClientAction> {
        let previous = std::mem::replace(&mut self.connection, state);
        let mut actions = Vec::new();
        if state != ConnectionState::Connected || previous == ConnectionState::Connected {
            return actions;
        }

        actions.push(ClientAction::Send(OutboundEvent::Register { role: self.role() }));
        self.resync(now, &mut actions);
        if self.role() == Role::Driver
            && self.session.status() == RideStatus::Idle
            && !self.has_inflight(ActionKind::FetchOffers)
        {
            actions.push(self.issue(ActionKind::FetchOffers, ApiCall::FetchOffers, None));
        }
        actions
    }

    fn on_location(&mut self, point: GeoPoint) -> Vec<ClientAction> {
        self.location = Some(point);
        let sharing = self.role() == Role::Driver
            && matches!(self.session.status(), RideStatus::Accepted | RideStatus::Started)
            && self.connection == ConnectionState::Connected;
        match self.session.ride_id() {
            Some(ride_id) if sharing => {
                vec![ClientAction::Send(OutboundEvent::location(ride_id.clone(), point))]
            },
            _ => Vec::new(),
        }
    }

    fn on_tick(&mut self, now: Instant) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        if let Some(progress) = self.clock.tick(now) {
            actions.push(ClientAction::ProgressChanged(progress));
        }

        let waiting = matches!(self.session.status(), RideStatus::Requesting | RideStatus::Pending);
        if let Some(requested_at) = self.requested_at.filter(|_| waiting) {
            if now.duration_since(requested_at) >= self.config.match_timeout {
                self.expire(now, &mut actions);
            }
        }

        let due = self.last_poll.is_none_or(|at| now.duration_since(at) >= self.config.poll_interval);
        if due {
            self.resync(now, &mut actions);
        }
        actions
    }

    fn expire(&mut self, now: Instant, actions: &mut Vec<ClientAction>) {
        let ride_id = self.session.ride_id().cloned();
        warn!(?ride_id, "no match before timeout");
        self.requested_at = None;
        self.abandon(ActionKind::Request);
        self.abandon(ActionKind::Accept);
        self.apply(
            RideInput::Fail { ride_id: ride_id.clone(), reason: FailureReason::Timeout },
            Source::Local,
            now,
            actions,
        );
        if let Some(ride_id) = ride_id {
            actions.push(self.issue(ActionKind::Abandon, ApiCall::CancelRide { ride_id }, None));
        }
    }

    /// Fetch the authoritative ride if one is active and no fetch is pending.
    fn resync(&mut self, now: Instant, actions: &mut Vec<ClientAction>) {
        if self.session.status().is_terminal() || self.has_inflight(ActionKind::Resync) {
            return;
        }
        let Some(ride_id) = self.session.ride_id().cloned() else {
            return;
        };
        self.last_poll = Some(now);
        debug!(%ride_id, "resyncing ride");
        actions.push(self.issue(ActionKind::Resync, ApiCall::FetchRide { ride_id }, None));
    }

    /// Merge a REST ride snapshot as a chain of inputs along legal edges.
    fn merge_snapshot(
        &mut self,
        ride: RidePayload,
        source: Source,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        let role = self.session.role();
        let current = self.session.status();
        let ride_id = ride.id.clone();
        let facts = RideFacts::from_payload(&ride);
        let ack = || RideInput::Ack { ride_id: ride_id.clone(), facts: facts.clone() };
        let accept = || RideInput::Accept {
            ride_id: ride_id.clone(),
            counterparty: Counterparty::for_role(role, &ride),
            facts: facts.clone(),
        };
        let start = || RideInput::Start { ride_id: ride_id.clone(), facts: facts.clone() };

        let chain: Vec<(RideStatus, RideInput)> = match ride.ride_status.unwrap_or(WireStatus::Unknown) {
            WireStatus::Pending => vec![(RideStatus::Pending, ack())],
            WireStatus::Accepted => {
                vec![(RideStatus::Pending, ack()), (RideStatus::Accepted, accept())]
            },
            WireStatus::Started => vec![
                (RideStatus::Pending, ack()),
                (RideStatus::Accepted, accept()),
                (RideStatus::Started, start()),
            ],
            WireStatus::Completed => vec![
                (RideStatus::Pending, ack()),
                (RideStatus::Accepted, accept()),
                (RideStatus::Started, start()),
                (RideStatus::Completed, RideInput::Complete {
                    ride_id: ride_id.clone(),
                    facts: facts.clone(),
                }),
            ],
            WireStatus::Cancelled => vec![(RideStatus::Cancelled, RideInput::Cancel {
                ride_id: Some(ride_id.clone()),
                reason: CancelReason::Remote(ride.reason.clone()),
            })],
            WireStatus::Failed => vec![(RideStatus::Failed, RideInput::Fail {
                ride_id: Some(ride_id.clone()),
                reason: FailureReason::Server(
                    ride.reason.clone().unwrap_or_else(|| "ride failed".to_string()),
                ),
            })],
            WireStatus::Unknown => vec![(current, RideInput::Refresh {
                ride_id: ride_id.clone(),
                facts: facts.clone(),
                driver_location: None,
            })],
        };

        self.last_poll = Some(now);
        for (target, input) in chain {
            let behind = matches!(
                (target.stage(), self.session.status().stage()),
                (Some(to), Some(at)) if to < at
            );
            if behind {
                continue;
            }
            if let Outcome::Dropped(_) = self.apply(input, source, now, actions) {
                break;
            }
        }
    }

    /// The single mutation path. Emits session/clock actions and runs
    /// transition side effects.
    fn apply(
        &mut self,
        input: RideInput,
        source: Source,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) -> Outcome {
        let outcome = self.session.apply(input, source);
        match &outcome {
            Outcome::Dropped(conflict) => {
                warn!(%conflict, ?source, status = %self.session.status(), "update dropped");
                actions.push(ClientAction::ConflictDropped(conflict.clone()));
            },
            Outcome::Unchanged => {},
            Outcome::Transitioned { .. } | Outcome::Refreshed => {
                actions.push(ClientAction::SessionChanged(self.session.snapshot()));
            },
        }
        if let Outcome::Transitioned { from, to } = outcome {
            info!(%from, %to, ride_id = ?self.session.ride_id(), "ride status changed");
            self.on_transition(from, to, now, actions);
        }
        self.sync_clock(now, actions);
        outcome
    }

    fn on_transition(
        &mut self,
        from: RideStatus,
        to: RideStatus,
        now: Instant,
        actions: &mut Vec<ClientAction>,
    ) {
        if !matches!(to, RideStatus::Requesting | RideStatus::Pending) {
            self.requested_at = None;
        }
        if !to.is_active() && !self.deferred.is_empty() {
            debug!(count = self.deferred.len(), "discarding deferred events");
            self.deferred.clear();
        }

        if from == RideStatus::Requesting && to == RideStatus::Pending {
            let replay = std::mem::take(&mut self.deferred);
            for routed in replay {
                debug!(receipt = routed.receipt, "replaying deferred event");
                self.on_socket(routed, now, actions);
            }
        }

        if to == RideStatus::Idle && self.role() == Role::Driver {
            for offer in self.offers.surface_pending() {
                actions.push(ClientAction::OfferAvailable(offer));
            }
        }
    }

    /// Keep the clock running exactly while the session is accepted or started.
    fn sync_clock(&mut self, now: Instant, actions: &mut Vec<ClientAction>) {
        let status = self.session.status();
        if matches!(status, RideStatus::Accepted | RideStatus::Started) {
            let phase = self.clock.progress().map(|p| p.phase);
            self.clock.start(status, self.session.metrics(), now);
            if phase != Some(status) {
                if let Some(progress) = self.clock.progress() {
                    actions.push(ClientAction::ProgressChanged(progress));
                }
            }
        } else if self.clock.stop() {
            actions.push(ClientAction::ProgressCleared);
        }
    }

    fn mirror(&self, event: OutboundEvent, actions: &mut Vec<ClientAction>) {
        if self.connection == ConnectionState::Connected {
            actions.push(ClientAction::Send(event));
        } else {
            debug!(event = event.name(), "not connected, skipping socket mirror");
        }
    }

    fn issue(&mut self, kind: ActionKind, call: ApiCall, offer: Option<RidePayload>) -> ClientAction {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        debug!(request = %id, call = call.name(), "api call issued");
        self.inflight.insert(id, Inflight { kind, call: call.clone(), abandoned: false, offer });
        ClientAction::Api(ApiRequest { id, call })
    }

    fn abandon(&mut self, kind: ActionKind) {
        for inflight in self.inflight.values_mut().filter(|f| f.kind == kind) {
            inflight.abandoned = true;
        }
    }

    fn has_inflight(&self, kind: ActionKind) -> bool {
        self.inflight.values().any(|f| f.kind == kind && !f.abandoned)
    }

    fn ensure_not_inflight(&self, kind: ActionKind) -> Result<(), ClientError> {
        if self.has_inflight(kind) {
            return Err(ClientError::ActionInFlight { action: kind.name() });
        }
        Ok(())
    }

    fn require(
        &self,
        action: &'static str,
        role: Option<Role>,
        allowed: &[RideStatus],
    ) -> Result<(), ClientError> {
        let role_ok = role.is_none_or(|role| role == self.session.role());
        if role_ok && allowed.contains(&self.session.status()) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> ClientError {
        ClientError::InvalidStateForAction {
            action,
            status: self.session.status(),
            role: self.session.role(),
        }
    }

    fn bound_ride(&self, action: &'static str) -> Result<RideId, ClientError> {
        self.session.ride_id().cloned().ok_or_else(|| self.invalid(action))
    }

    fn is_own(&self, ride_id: &RideId) -> bool {
        self.session.ride_id() == Some(ride_id)
    }
}

/// Ride payload of a successful reply, synthesizing one from the call when
/// the backend answered without a body.
fn reply_ride(call: &ApiCall, reply: ApiReply) -> Option<RidePayload> {
    match reply {
        ApiReply::Ride(ride) => Some(ride),
        ApiReply::Done => {
            let ride_id = call.ride_id()?.clone();
            let mut ride = RidePayload::new(ride_id);
            ride.ride_status = call.implied_status();
            Some(ride)
        },
        ApiReply::Offers(_) => None,
    }
}

fn failed(kind: ActionKind, err: &ApiError) -> ClientAction {
    ClientAction::ActionFailed { action: kind.name(), reason: err.to_string() }
}
