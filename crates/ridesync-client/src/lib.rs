//! Ride client: reconciliation of REST responses, socket events and timers.
//!
//! The [`Client`] is a pure state machine in the same style as the core
//! crate. It decides which REST calls to make and which socket frames to
//! send, but performs neither; runtimes execute its [`ClientAction`]s and
//! feed results back as [`ClientEvent`]s.
//!
//! # Components
//!
//! - [`Client`]: Session owner and the only mutation path
//! - [`RideApi`]: Async trait for executing REST calls
//! - [`OfferBook`]: Driver ride offers, queued while busy
//! - `transport` (feature `transport`): reqwest and tokio-tungstenite adapters

pub mod action;
pub mod api;
pub mod client;
pub mod error;
pub mod event;
pub mod offers;
#[cfg(feature = "transport")]
pub mod transport;

pub use action::ClientAction;
pub use api::{ApiCall, ApiError, ApiReply, ApiRequest, RequestId, RideApi};
pub use client::{Client, ClientConfig};
pub use error::ClientError;
pub use event::ClientEvent;
pub use offers::OfferBook;
