//! Core state machines for ride lifecycle synchronization.
//!
//! Everything here is pure: no sockets, no HTTP, no system clock. Time is
//! passed in as `Instant`, and I/O is requested by returning actions, so the
//! same code runs in production and in deterministic simulation.
//!
//! # Components
//!
//! - [`RideSession`]: The ride state machine and its guarded apply path
//! - [`Channel`]: Single-connection transport lifecycle with bounded reconnect
//! - [`EventRouter`]: Frame decoding and ordered dispatch
//! - [`SimulationClock`]: Presentational progress between backend updates
//! - [`FareTable`]: Fare/ETA estimates and haversine distance
//! - [`Environment`]: Time abstraction for runtimes

pub mod channel;
pub mod clock;
pub mod env;
pub mod error;
pub mod fare;
pub mod ride;
pub mod router;
pub mod session;

pub use channel::{Channel, ChannelAction, ChannelConfig, ChannelHandle, ConnectionState};
pub use clock::{Bounds, ClockConfig, Progress, SimulationClock};
pub use env::{Environment, SystemEnv};
pub use error::{ChannelError, Conflict};
pub use fare::{FareEstimator, FareTable, Quote, Tariff, UnknownVehicleClass, VehicleClass, haversine_km};
pub use ride::{CancelReason, Counterparty, FailureReason, Metrics, Origin, Quantity, RideStatus};
pub use router::{EventRouter, EventSink, Routed, SubscriptionId};
pub use session::{Outcome, RideFacts, RideInput, RideSession, SessionSnapshot, Source};
