//! Deterministic simulation harness for ride synchronization testing.
//!
//! Virtual time, an in-memory backend and a multi-participant world in which
//! REST responses and socket pushes are queued and delivered in a chosen
//! (or seeded random) order, so interleavings are reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_api;
pub mod sim_backend;
pub mod sim_driver;
pub mod sim_env;
pub mod world;

pub use sim_api::{SharedBackend, SimApi};
pub use sim_backend::{Push, SimBackend};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::SimEnv;
pub use world::{Delivery, ParticipantId, SimWorld};
