//! Scripted [`Driver`] for runtime tests.
//!
//! Connects succeed immediately unless the test queued another outcome.
//! REST calls are recorded and, when a backend is attached, answered
//! straight away: the response and any push addressed to this driver's user
//! are queued for the next poll. An empty poll advances virtual time by the
//! poll timeout.

use std::{
    collections::VecDeque,
    future::Future,
    time::{Duration, Instant},
};

use ridesync_app::{App, AppEvent, Driver, DriverEvent};
use ridesync_client::ApiRequest;
use ridesync_core::{Environment, RideStatus};

use crate::{
    sim_api::{SharedBackend, lock},
    sim_env::SimEnv,
};

/// Errors from [`SimDriver`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimDriverError {
    /// Frame sent without an open socket.
    #[error("socket not connected")]
    NotConnected,

    /// Rendering was configured to fail.
    #[error("render failed")]
    RenderFailed,
}

/// In-memory driver.
#[derive(Debug)]
pub struct SimDriver {
    env: SimEnv,
    backend: Option<(SharedBackend, String)>,
    inbox: VecDeque<DriverEvent>,
    connect_outcomes: VecDeque<DriverEvent>,
    connects: Vec<String>,
    sent: Vec<String>,
    executed: Vec<ApiRequest>,
    rendered: Vec<RideStatus>,
    connected: bool,
    stopped: bool,
    fail_render: bool,
}

impl SimDriver {
    /// Driver with no backend; REST calls are only recorded.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            backend: None,
            inbox: VecDeque::new(),
            connect_outcomes: VecDeque::new(),
            connects: Vec::new(),
            sent: Vec::new(),
            executed: Vec::new(),
            rendered: Vec::new(),
            connected: false,
            stopped: false,
            fail_render: false,
        }
    }

    /// Driver answering REST calls from `backend` as `user`.
    #[must_use]
    pub fn with_backend(mut self, backend: SharedBackend, user: impl Into<String>) -> Self {
        self.backend = Some((backend, user.into()));
        self
    }

    /// Queue an event for the next poll.
    pub fn push(&mut self, event: DriverEvent) {
        self.inbox.push_back(event);
    }

    /// Queue user input.
    pub fn input(&mut self, event: AppEvent) {
        self.push(DriverEvent::Input(event));
    }

    /// The server closes the socket.
    pub fn close_from_server(&mut self, code: Option<u16>) {
        self.connected = false;
        self.push(DriverEvent::Closed { code });
    }

    /// Outcome of the next connect attempt instead of `Connected`.
    pub fn script_connect(&mut self, outcome: DriverEvent) {
        self.connect_outcomes.push_back(outcome);
    }

    /// Make every subsequent render fail.
    pub fn fail_renders(&mut self) {
        self.fail_render = true;
    }

    /// URLs connected to, in order.
    pub fn connects(&self) -> &[String] {
        &self.connects
    }

    /// Frames sent.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// REST calls started.
    pub fn executed(&self) -> &[ApiRequest] {
        &self.executed
    }

    /// Ride status at each render.
    pub fn rendered(&self) -> &[RideStatus] {
        &self.rendered
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Events not yet polled.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    fn poll_events(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<DriverEvent>, Self::Error>> + Send {
        let events: Vec<_> = self.inbox.drain(..).collect();
        if events.is_empty() {
            self.env.advance(timeout);
        }
        std::future::ready(Ok(events))
    }

    fn connect(&mut self, url: &str) {
        self.connects.push(url.to_string());
        let outcome = self.connect_outcomes.pop_front().unwrap_or(DriverEvent::Connected);
        self.connected = outcome == DriverEvent::Connected;
        self.inbox.push_back(outcome);
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn send_frame(&mut self, frame: String) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(SimDriverError::NotConnected);
        }
        self.sent.push(frame);
        Ok(())
    }

    fn execute(&mut self, request: ApiRequest) {
        self.executed.push(request.clone());
        let Some((backend, user)) = &self.backend else {
            return;
        };
        let (result, pushes) = lock(backend).handle_call(user, &request.call);
        self.inbox.push_back(DriverEvent::ApiResponse { request_id: request.id, result });
        if self.connected {
            let frames = pushes.into_iter().filter(|p| &p.to == user).map(|p| DriverEvent::Frame(p.frame));
            self.inbox.extend(frames);
        }
    }

    fn now(&self) -> Instant {
        self.env.now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        if self.fail_render {
            return Err(SimDriverError::RenderFailed);
        }
        self.rendered.push(app.status());
        Ok(())
    }

    fn stop(&mut self) {
        self.connected = false;
        self.stopped = true;
    }
}
