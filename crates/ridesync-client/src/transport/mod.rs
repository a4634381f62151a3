//! Production transports.
//!
//! - [`HttpApi`]: [`crate::RideApi`] over reqwest
//! - [`connect`]: WebSocket over tokio-tungstenite, split into a
//!   [`SocketWriter`] and a [`SocketReader`]

mod http;
mod ws;

pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpApi};
pub use ws::{SocketError, SocketMessage, SocketReader, SocketWriter, connect};
