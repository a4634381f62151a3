//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use ridesync_client::{ApiError, ApiReply, ApiRequest, RequestId};

use crate::{App, AppEvent};

/// Something the outside world produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// User input.
    Input(AppEvent),
    /// The socket finished opening.
    Connected,
    /// The socket could not be opened.
    ConnectFailed {
        /// Transport message.
        reason: String,
        /// Close code equivalent when the handshake was refused for auth.
        code: Option<u16>,
    },
    /// The socket closed.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
    },
    /// A raw text frame arrived.
    Frame(String),
    /// A REST call finished.
    ApiResponse {
        /// Correlation id of the request.
        request_id: RequestId,
        /// Outcome.
        result: Result<ApiReply, ApiError>,
    },
}

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`crate::Runtime`] handles orchestration logic. This ensures
/// the same orchestration code runs in the CLI and in simulation.
///
/// `connect` and `execute` only start work; completions come back from
/// [`Driver::poll_events`], so socket traffic interleaves with REST calls.
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Wait up to `timeout` for events.
    ///
    /// Returns an empty vector if nothing happened.
    fn poll_events(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<DriverEvent>, Self::Error>> + Send;

    /// Start opening a socket to `url`.
    fn connect(&mut self, url: &str);

    /// Close the socket, if open.
    fn disconnect(&mut self);

    /// Send a text frame over the open socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is closed or the send fails.
    fn send_frame(&mut self, frame: String) -> Result<(), Self::Error>;

    /// Start a REST call.
    fn execute(&mut self, request: ApiRequest);

    /// Current time instant. Virtual in simulation.
    fn now(&self) -> Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App) -> Result<(), Self::Error>;

    /// Stop the connection and clean up resources.
    fn stop(&mut self);
}
