//! Transport channel state machine.
//!
//! Owns the lifecycle of the single WebSocket connection to the backend:
//! open, authenticate (token in the URL), reconnect with backoff, close.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as a parameter (no stored Environment)
//! - Methods return `Vec<ChannelAction>` (or a `Result` of them)
//! - The runtime executes actions (open a socket, write a frame, ...)
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐  open / reconnect timer  ┌────────────┐  socket up  ┌───────────┐
//! │ Disconnected │─────────────────────────>│ Connecting │────────────>│ Connected │
//! └──────────────┘                          └────────────┘             └───────────┘
//!        ^                                        │ connect failed          │ closed
//!        └────────────────────────────────────────┴─────────────────────────┘
//! ```
//!
//! # Reconnect
//!
//! - Unexpected closure schedules exactly one reconnect after `reconnect_backoff`
//! - At most one reconnect timer is outstanding; `close()` cancels it
//! - Authentication close codes are terminal, no reconnect
//! - After `max_reconnect_attempts` consecutive failures the channel gives up

use std::time::{Duration, Instant};

use ridesync_proto::OutboundEvent;
use tracing::{debug, info, warn};

use crate::error::ChannelError;

/// Connectivity as seen by the rest of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket opening.
    Connecting,
    /// Socket open.
    Connected,
}

impl ConnectionState {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint, without the token query.
    pub endpoint: String,
    /// Delay before a reconnect attempt.
    pub reconnect_backoff: Duration,
    /// Consecutive reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Close codes that mean the token was rejected.
    pub auth_close_codes: Vec<u16>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:5000/ws".to_string(),
            reconnect_backoff: Duration::from_secs(2),
            max_reconnect_attempts: 10,
            auth_close_codes: vec![1008, 4001],
        }
    }
}

/// Handle to an open channel. Stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    /// Numeric id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Actions returned by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Open a socket to this URL.
    Connect {
        /// Endpoint with token.
        url: String,
    },
    /// Close the current socket.
    Disconnect,
    /// Write this text frame.
    SendFrame(String),
    /// Connectivity changed.
    StateChanged(ConnectionState),
    /// The channel gave up. No further reconnects.
    Fatal(ChannelError),
}

/// Transport channel state machine.
#[derive(Debug, Clone)]
pub struct Channel {
    config: ChannelConfig,
    state: ConnectionState,
    token: Option<String>,
    handle: Option<ChannelHandle>,
    next_handle: u64,
    reconnect_at: Option<Instant>,
    attempts: u32,
    sockets_opened: u64,
}

impl Channel {
    /// Closed channel.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            token: None,
            handle: None,
            next_handle: 1,
            reconnect_at: None,
            attempts: 0,
            sockets_opened: 0,
        }
    }

    /// Current connectivity.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handle of the open channel, if any.
    pub fn handle(&self) -> Option<ChannelHandle> {
        self.handle
    }

    /// Whether frames can be sent.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// When the pending reconnect fires, if one is scheduled.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts
    }

    /// Sockets requested over the channel's lifetime.
    pub fn sockets_opened(&self) -> u64 {
        self.sockets_opened
    }

    /// Open the channel for `token`.
    ///
    /// Idempotent: while a channel is open for the same token the existing
    /// handle is returned and no socket is created.
    ///
    /// # Errors
    ///
    /// `TokenMismatch` if the channel is open for a different token.
    pub fn open(
        &mut self,
        token: &str,
        now: Instant,
    ) -> Result<(ChannelHandle, Vec<ChannelAction>), ChannelError> {
        if let Some(handle) = self.handle {
            if self.token.as_deref() == Some(token) {
                debug!(handle = handle.id(), state = %self.state, "channel already open");
                return Ok((handle, Vec::new()));
            }
            return Err(ChannelError::TokenMismatch);
        }

        let handle = ChannelHandle(self.next_handle);
        self.next_handle += 1;
        self.handle = Some(handle);
        self.token = Some(token.to_string());
        self.attempts = 0;
        self.reconnect_at = None;

        info!(handle = handle.id(), "opening channel");
        Ok((handle, self.connect(now)))
    }

    /// Caller-initiated close. Cancels any pending reconnect.
    pub fn close(&mut self) -> Vec<ChannelAction> {
        let Some(handle) = self.handle.take() else {
            return Vec::new();
        };
        self.token = None;
        self.reconnect_at = None;
        self.attempts = 0;

        let mut actions = Vec::new();
        if self.state != ConnectionState::Disconnected {
            actions.push(ChannelAction::Disconnect);
        }
        self.set_state(ConnectionState::Disconnected, &mut actions);
        info!(handle = handle.id(), "channel closed");
        actions
    }

    /// The socket finished opening.
    pub fn on_connected(&mut self, _now: Instant) -> Vec<ChannelAction> {
        if self.handle.is_none() || self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "ignoring connect for stale socket");
            return Vec::new();
        }
        self.attempts = 0;
        self.reconnect_at = None;

        let mut actions = Vec::new();
        self.set_state(ConnectionState::Connected, &mut actions);
        actions
    }

    /// The socket could not be opened.
    pub fn on_connect_failed(&mut self, reason: &str, now: Instant) -> Vec<ChannelAction> {
        if self.handle.is_none() {
            return Vec::new();
        }
        warn!(reason, attempts = self.attempts, "connect failed");
        self.schedule_reconnect(now)
    }

    /// The socket closed without the caller asking.
    pub fn on_closed(&mut self, code: Option<u16>, now: Instant) -> Vec<ChannelAction> {
        let Some(handle) = self.handle else {
            return Vec::new();
        };

        if let Some(code) = code.filter(|code| self.config.auth_close_codes.contains(code)) {
            warn!(handle = handle.id(), code, "token rejected, not reconnecting");
            return self.give_up(ChannelError::AuthRejected { code });
        }

        info!(handle = handle.id(), ?code, "socket closed unexpectedly");
        self.schedule_reconnect(now)
    }

    /// Fire the reconnect timer if due.
    pub fn tick(&mut self, now: Instant) -> Vec<ChannelAction> {
        match self.reconnect_at {
            Some(at) if at <= now => {
                self.reconnect_at = None;
                self.attempts += 1;
                info!(attempt = self.attempts, "reconnecting");
                self.connect(now)
            },
            _ => Vec::new(),
        }
    }

    /// Encode an outbound event for sending.
    ///
    /// # Errors
    ///
    /// `NotConnected` unless the socket is open; nothing is queued.
    pub fn send(&self, event: &OutboundEvent) -> Result<ChannelAction, ChannelError> {
        if self.state != ConnectionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        Ok(ChannelAction::SendFrame(event.to_frame()?))
    }

    fn connect(&mut self, _now: Instant) -> Vec<ChannelAction> {
        let Some(token) = self.token.as_deref() else {
            return Vec::new();
        };
        let separator = if self.config.endpoint.contains('?') { '&' } else { '?' };
        let token: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
        let url = format!("{}{separator}token={token}", self.config.endpoint);

        self.sockets_opened += 1;
        let mut actions = Vec::new();
        self.set_state(ConnectionState::Connecting, &mut actions);
        actions.push(ChannelAction::Connect { url });
        actions
    }

    fn schedule_reconnect(&mut self, now: Instant) -> Vec<ChannelAction> {
        let mut actions = Vec::new();
        self.set_state(ConnectionState::Disconnected, &mut actions);

        if self.reconnect_at.is_some() {
            return actions;
        }
        if self.attempts >= self.config.max_reconnect_attempts {
            let attempts = self.attempts;
            actions.extend(self.give_up(ChannelError::ReconnectExhausted { attempts }));
            return actions;
        }

        self.reconnect_at = Some(now + self.config.reconnect_backoff);
        debug!(backoff = ?self.config.reconnect_backoff, "reconnect scheduled");
        actions
    }

    fn give_up(&mut self, error: ChannelError) -> Vec<ChannelAction> {
        self.handle = None;
        self.token = None;
        self.reconnect_at = None;

        let mut actions = Vec::new();
        self.set_state(ConnectionState::Disconnected, &mut actions);
        actions.push(ChannelAction::Fatal(error));
        actions
    }

    fn set_state(&mut self, state: ConnectionState, actions: &mut Vec<ChannelAction>) {
        if self.state != state {
            self.state = state;
            actions.push(ChannelAction::StateChanged(state));
        }
    }
}
