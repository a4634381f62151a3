//! Multi-participant simulation.
//!
//! A [`SimWorld`] holds any number of riders and drivers, each with its own
//! [`Client`] and [`EventRouter`], all sharing one [`SimBackend`] and one
//! virtual clock. Nothing moves on its own: REST calls, their responses and
//! socket pushes sit in an in-flight queue until the test delivers them, in
//! order or shuffled by the seeded RNG.
//!
//! REST calls are executed by the backend when they are delivered, not when
//! they are issued, so the order in which two participants' calls reach the
//! backend is itself part of the schedule.

use std::{collections::VecDeque, time::Duration};

use ridesync_client::{
    ApiError, ApiReply, ApiRequest, Client, ClientAction, ClientConfig, ClientError, ClientEvent,
    RequestId,
};
use ridesync_core::{ConnectionState, EventRouter, SessionSnapshot};
use ridesync_proto::{OutboundEvent, RideId, Role};
use tracing::{debug, trace, warn};

use crate::{
    sim_backend::{Push, SimBackend},
    sim_env::SimEnv,
};

/// Upper bound on deliveries in one `run_until_quiet*` call.
const MAX_DELIVERIES: usize = 10_000;

/// Index of a participant in a [`SimWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantId(usize);

/// Something on its way between a participant and the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A REST call travelling to the backend.
    Call {
        /// Caller.
        from: ParticipantId,
        /// The call.
        request: ApiRequest,
    },
    /// A REST response travelling back.
    Response {
        /// Caller.
        to: ParticipantId,
        /// Request being answered.
        request_id: RequestId,
        /// Outcome.
        result: Result<ApiReply, ApiError>,
    },
    /// A socket frame pushed by the backend.
    Frame {
        /// Recipient.
        to: ParticipantId,
        /// Encoded frame.
        raw: String,
    },
}

#[derive(Debug)]
struct Participant {
    user: String,
    client: Client<SimEnv>,
    router: EventRouter,
    connected: bool,
    actions: Vec<ClientAction>,
    sent: Vec<OutboundEvent>,
}

/// Deterministic world of riders, drivers and one backend.
#[derive(Debug)]
pub struct SimWorld {
    env: SimEnv,
    config: ClientConfig,
    backend: SimBackend,
    participants: Vec<Participant>,
    in_flight: VecDeque<Delivery>,
    delivered: u64,
    lost: u64,
}

impl SimWorld {
    /// Empty world with the default client configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, ClientConfig::default())
    }

    /// Empty world whose clients use `config`.
    pub fn with_config(seed: u64, config: ClientConfig) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            config,
            backend: SimBackend::new(),
            participants: Vec::new(),
            in_flight: VecDeque::new(),
            delivered: 0,
            lost: 0,
        }
    }

    /// Add a rider.
    pub fn add_rider(&mut self, user: &str) -> ParticipantId {
        self.add(user, Role::Rider)
    }

    /// Add a driver. Drivers receive ride broadcasts from the start.
    pub fn add_driver(&mut self, user: &str) -> ParticipantId {
        self.add(user, Role::Driver)
    }

    fn add(&mut self, user: &str, role: Role) -> ParticipantId {
        self.backend.add_user(user, role);
        self.participants.push(Participant {
            user: user.to_string(),
            client: Client::new(self.env.clone(), role, self.config.clone()),
            router: EventRouter::new(),
            connected: false,
            actions: Vec::new(),
            sent: Vec::new(),
        });
        ParticipantId(self.participants.len() - 1)
    }

    /// Shared virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The backend.
    pub fn backend(&self) -> &SimBackend {
        &self.backend
    }

    /// A participant's client.
    pub fn client(&self, id: ParticipantId) -> &Client<SimEnv> {
        &self.participants[id.0].client
    }

    /// A participant's session.
    pub fn session(&self, id: ParticipantId) -> SessionSnapshot {
        self.client(id).snapshot()
    }

    /// Every non-network action a participant's client produced, in order.
    pub fn actions(&self, id: ParticipantId) -> &[ClientAction] {
        &self.participants[id.0].actions
    }

    /// Socket events a participant sent.
    pub fn sent(&self, id: ParticipantId) -> &[OutboundEvent] {
        &self.participants[id.0].sent
    }

    /// Whether a participant's socket is up.
    pub fn is_connected(&self, id: ParticipantId) -> bool {
        self.participants[id.0].connected
    }

    /// Deliveries waiting.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Deliveries made so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Frames dropped because the recipient was offline.
    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Bring a participant's socket up.
    pub fn connect(&mut self, id: ParticipantId) {
        self.participants[id.0].connected = true;
        self.feed(id, ClientEvent::ConnectionChanged(ConnectionState::Connected));
    }

    /// Take a participant's socket down. Frames in flight to it are lost.
    pub fn disconnect(&mut self, id: ParticipantId) {
        self.participants[id.0].connected = false;
        self.feed(id, ClientEvent::ConnectionChanged(ConnectionState::Disconnected));
    }

    /// Feed a user action to a participant's client.
    ///
    /// # Errors
    ///
    /// The client's precondition error, if it refused the action.
    pub fn act(&mut self, id: ParticipantId, event: ClientEvent) -> Result<(), ClientError> {
        let actions = self.participants[id.0].client.handle(event)?;
        self.execute(id, actions);
        Ok(())
    }

    /// Cancel a ride from the backend side.
    pub fn server_cancel(&mut self, ride_id: &RideId, reason: &str) {
        let pushes = self.backend.server_cancel(ride_id, reason);
        self.enqueue_pushes(pushes);
    }

    /// Inject a raw frame for a participant, bypassing the backend.
    pub fn inject_frame(&mut self, to: ParticipantId, raw: impl Into<String>) {
        self.in_flight.push_back(Delivery::Frame { to, raw: raw.into() });
    }

    /// Move virtual time forward and tick every client.
    pub fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        for index in 0..self.participants.len() {
            self.feed(ParticipantId(index), ClientEvent::Tick);
        }
    }

    /// Deliver the oldest in-flight item. Returns `false` when idle.
    pub fn deliver_next(&mut self) -> bool {
        match self.in_flight.pop_front() {
            Some(delivery) => {
                self.deliver(delivery);
                true
            },
            None => false,
        }
    }

    /// Deliver a random in-flight item. Returns `false` when idle.
    pub fn deliver_random(&mut self) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        let index = self.env.random_index(self.in_flight.len());
        match self.in_flight.remove(index) {
            Some(delivery) => {
                self.deliver(delivery);
                true
            },
            None => false,
        }
    }

    /// Deliver in order until nothing is in flight. Returns deliveries made.
    pub fn run_until_quiet(&mut self) -> usize {
        self.run_with(Self::deliver_next)
    }

    /// Deliver in random order until nothing is in flight.
    pub fn run_until_quiet_shuffled(&mut self) -> usize {
        self.run_with(Self::deliver_random)
    }

    fn run_with(&mut self, mut step: impl FnMut(&mut Self) -> bool) -> usize {
        let mut count = 0;
        while count < MAX_DELIVERIES && step(self) {
            count += 1;
        }
        if count == MAX_DELIVERIES {
            warn!(in_flight = self.in_flight.len(), "delivery limit reached");
        }
        count
    }

    fn deliver(&mut self, delivery: Delivery) {
        self.delivered += 1;
        match delivery {
            Delivery::Call { from, request } => {
                let user = self.participants[from.0].user.clone();
                let (result, pushes) = self.backend.handle_call(&user, &request.call);
                self.in_flight.push_back(Delivery::Response { to: from, request_id: request.id, result });
                self.enqueue_pushes(pushes);
            },
            Delivery::Response { to, request_id, result } => {
                self.feed(to, ClientEvent::ApiResponse { request_id, result });
            },
            Delivery::Frame { to, raw } => {
                let participant = &mut self.participants[to.0];
                if !participant.connected {
                    trace!(user = %participant.user, "frame lost while offline");
                    self.lost += 1;
                    return;
                }
                // Decode failures are logged by the router.
                if let Ok(routed) = participant.router.decode(&raw) {
                    self.feed(to, ClientEvent::Socket(routed.clone()));
                    self.participants[to.0].router.dispatch(&routed);
                }
            },
        }
    }

    /// Feed an event that cannot fail a precondition.
    fn feed(&mut self, id: ParticipantId, event: ClientEvent) {
        match self.participants[id.0].client.handle(event) {
            Ok(actions) => self.execute(id, actions),
            Err(err) => warn!(user = %self.participants[id.0].user, error = %err, "event refused"),
        }
    }

    fn execute(&mut self, id: ParticipantId, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::Api(request) => {
                    debug!(user = %self.participants[id.0].user, call = request.call.name(), "call issued");
                    self.in_flight.push_back(Delivery::Call { from: id, request });
                },
                ClientAction::Send(event) => {
                    let participant = &mut self.participants[id.0];
                    if !participant.connected {
                        debug!(user = %participant.user, event = event.name(), "send while offline");
                        continue;
                    }
                    let user = participant.user.clone();
                    participant.sent.push(event.clone());
                    let pushes = self.backend.handle_socket(&user, &event);
                    self.enqueue_pushes(pushes);
                },
                other => self.participants[id.0].actions.push(other),
            }
        }
    }

    fn enqueue_pushes(&mut self, pushes: Vec<Push>) {
        for push in pushes {
            match self.participants.iter().position(|p| p.user == push.to) {
                Some(index) => {
                    self.in_flight.push_back(Delivery::Frame { to: ParticipantId(index), raw: push.frame });
                },
                None => {
                    trace!(to = %push.to, "push for unknown user");
                    self.lost += 1;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ridesync_core::{RideStatus, VehicleClass};
    use ridesync_proto::Location;

    use super::*;

    fn request() -> ClientEvent {
        ClientEvent::RequestRide {
            pickup: Location::new(28.6139, 77.2090),
            dropoff: Location::new(28.4595, 77.0266),
            vehicle: VehicleClass::UberX,
        }
    }

    #[test]
    fn full_ride() {
        let mut world = SimWorld::new(1);
        let rider = world.add_rider("rider");
        let driver = world.add_driver("driver");
        world.connect(rider);
        world.connect(driver);
        world.run_until_quiet();

        world.act(rider, request()).unwrap();
        world.run_until_quiet();
        let ride_id = world.session(rider).ride_id.unwrap();
        assert_eq!(world.session(rider).status, RideStatus::Pending);
        assert!(world.client(driver).offers().contains(&ride_id));

        world.act(driver, ClientEvent::AcceptRide { ride_id: ride_id.clone() }).unwrap();
        world.run_until_quiet();
        assert_eq!(world.session(rider).status, RideStatus::Accepted);
        assert_eq!(world.session(driver).status, RideStatus::Accepted);

        world.act(driver, ClientEvent::StartRide).unwrap();
        world.run_until_quiet();
        world.act(driver, ClientEvent::CompleteRide).unwrap();
        world.run_until_quiet();

        assert_eq!(world.session(rider).status, RideStatus::Completed);
        assert_eq!(world.session(driver).status, RideStatus::Completed);
        assert_eq!(world.session(driver).ride_id, Some(ride_id));
    }

    #[test]
    fn offline_frames_are_lost() {
        let mut world = SimWorld::new(2);
        let rider = world.add_rider("rider");
        let driver = world.add_driver("driver");
        world.connect(rider);

        world.act(rider, request()).unwrap();
        world.run_until_quiet();

        assert_eq!(world.lost(), 1);
        assert!(world.client(driver).offers().is_empty());
    }

    #[test]
    fn connect_registers() {
        let mut world = SimWorld::new(3);
        let driver = world.add_driver("driver");
        world.connect(driver);
        world.run_until_quiet();

        assert_eq!(world.sent(driver), [OutboundEvent::Register { role: Role::Driver }]);
        assert!(world.is_connected(driver));
    }
}
