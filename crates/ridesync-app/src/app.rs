//! Application view state.
//!
//! [`App`] turns user input into [`AppAction`]s and folds client output into
//! what a frontend shows: the session, simulated progress, driver offers, a
//! connectivity banner and a short list of notices. It never talks to the
//! network.

use std::collections::VecDeque;

use ridesync_client::{ClientAction, ClientError};
use ridesync_core::{ChannelError, ConnectionState, Progress, RideStatus, SessionSnapshot};
use ridesync_proto::{RideId, RidePayload, Role};
use tracing::debug;

use crate::{AppAction, AppEvent, Notice};

/// Notices kept before the oldest is dropped.
const MAX_NOTICES: usize = 8;

/// Application state.
#[derive(Debug, Clone)]
pub struct App {
    role: Role,
    connection: ConnectionState,
    session: Option<SessionSnapshot>,
    progress: Option<Progress>,
    offers: Vec<RidePayload>,
    notices: VecDeque<Notice>,
    connection_error: Option<ChannelError>,
    should_quit: bool,
    dirty: bool,
}

impl App {
    /// Fresh state for `role`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            connection: ConnectionState::Disconnected,
            session: None,
            progress: None,
            offers: Vec::new(),
            notices: VecDeque::new(),
            connection_error: None,
            should_quit: false,
            dirty: true,
        }
    }

    /// Session role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Socket connectivity.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Latest session, once the client reported one.
    pub fn session(&self) -> Option<&SessionSnapshot> {
        self.session.as_ref()
    }

    /// Ride status, `Idle` before the first session change.
    pub fn status(&self) -> RideStatus {
        self.session.as_ref().map_or(RideStatus::Idle, |s| s.status)
    }

    /// Simulated progress while the clock runs.
    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    /// Offers shown to the driver, newest first.
    pub fn offers(&self) -> &[RidePayload] {
        &self.offers
    }

    /// Notices, oldest first.
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    /// Last fatal connection error.
    pub fn connection_error(&self) -> Option<&ChannelError> {
        self.connection_error.as_ref()
    }

    /// Whether the backend rejected our credentials.
    pub fn auth_failed(&self) -> bool {
        matches!(self.connection_error, Some(ChannelError::AuthRejected { .. }))
    }

    /// Whether the user asked to quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Connectivity banner, when there is something to say.
    pub fn banner(&self) -> Option<String> {
        if let Some(err) = &self.connection_error {
            return Some(match err {
                ChannelError::AuthRejected { .. } => "session expired, please log in again".to_string(),
                other => format!("offline: {other}"),
            });
        }
        match self.connection {
            ConnectionState::Connected => None,
            ConnectionState::Connecting => Some("connecting...".to_string()),
            ConnectionState::Disconnected => Some("offline".to_string()),
        }
    }

    /// Whether the view changed since the last call. Clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Process user input.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        let action = match event {
            AppEvent::RequestRide { pickup, dropoff, vehicle } => {
                AppAction::RequestRide { pickup, dropoff, vehicle }
            },
            AppEvent::AcceptOffer { ride_id } => AppAction::AcceptRide { ride_id },
            AppEvent::RejectOffer { ride_id } => AppAction::RejectOffer { ride_id },
            AppEvent::StartRide => AppAction::StartRide,
            AppEvent::CompleteRide => AppAction::CompleteRide,
            AppEvent::CancelRide => AppAction::CancelRide,
            AppEvent::Dismiss => {
                self.notices.clear();
                self.dirty = true;
                if !self.status().is_terminal() {
                    return Vec::new();
                }
                AppAction::ResetSession
            },
            AppEvent::LocationFix(point) => AppAction::UpdateLocation(point),
            AppEvent::LocationError(reason) => AppAction::LocationFailed { reason },
            AppEvent::Connect => {
                self.connection_error = None;
                self.dirty = true;
                AppAction::Connect
            },
            AppEvent::Disconnect => AppAction::Disconnect,
            AppEvent::Quit => {
                self.should_quit = true;
                AppAction::Quit
            },
        };
        vec![action]
    }

    /// Fold one client action into the view. Returns whether anything changed.
    ///
    /// Network-bound actions (`Api`, `Send`) are ignored here.
    pub fn apply(&mut self, action: &ClientAction) -> bool {
        match action {
            ClientAction::Api(_) | ClientAction::Send(_) => return false,
            ClientAction::SessionChanged(snapshot) => {
                let was = self.status();
                self.session = Some(snapshot.clone());
                if was != snapshot.status {
                    if let Some(text) = status_notice(snapshot) {
                        self.push(Notice::info(text));
                    }
                }
            },
            ClientAction::ProgressChanged(progress) => self.progress = Some(*progress),
            ClientAction::ProgressCleared => self.progress = None,
            ClientAction::OfferAvailable(offer) => {
                self.offers.retain(|o| o.id != offer.id);
                self.offers.insert(0, offer.clone());
            },
            ClientAction::OfferWithdrawn(ride_id) => self.remove_offer(ride_id),
            ClientAction::ActionFailed { action, reason } => {
                self.push(Notice::error(format!("{action} failed: {reason}")));
            },
            ClientAction::ConflictDropped(conflict) => {
                debug!(%conflict, "conflict not shown");
                return false;
            },
            ClientAction::ServerError { message } => self.push(Notice::error(message.clone())),
            ClientAction::LocationUnavailable { reason } => {
                self.push(Notice::warning(format!("location unavailable: {reason}")));
            },
        }
        self.dirty = true;
        true
    }

    /// A user action was refused locally.
    pub fn on_client_error(&mut self, err: &ClientError) {
        self.push(Notice::warning(err.to_string()));
        self.dirty = true;
    }

    /// Channel connectivity changed.
    pub fn on_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            self.connection = state;
            if state == ConnectionState::Connected {
                self.connection_error = None;
            }
            self.dirty = true;
        }
    }

    /// The channel gave up.
    pub fn on_channel_error(&mut self, err: ChannelError) {
        self.push(Notice::error(err.to_string()));
        self.connection_error = Some(err);
        self.dirty = true;
    }

    fn remove_offer(&mut self, ride_id: &RideId) {
        self.offers.retain(|o| &o.id != ride_id);
    }

    fn push(&mut self, notice: Notice) {
        if self.notices.len() >= MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }
}

fn status_notice(snapshot: &SessionSnapshot) -> Option<String> {
    let text = match snapshot.status {
        RideStatus::Pending => "looking for a driver".to_string(),
        RideStatus::Accepted => match &snapshot.counterparty {
            Some(party) => format!("matched with {}", party.name.as_deref().unwrap_or(&party.id)),
            None => "ride accepted".to_string(),
        },
        RideStatus::Started => "ride started".to_string(),
        RideStatus::Completed => "ride completed".to_string(),
        RideStatus::Cancelled => match &snapshot.cancel_reason {
            Some(reason) => format!("ride cancelled: {reason}"),
            None => "ride cancelled".to_string(),
        },
        RideStatus::Failed => match &snapshot.failure {
            Some(reason) => format!("ride failed: {reason}"),
            None => "ride failed".to_string(),
        },
        RideStatus::Idle | RideStatus::Requesting => return None,
    };
    Some(text)
}
