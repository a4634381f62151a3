//! Protocol bridge.
//!
//! Translates [`AppAction`]s into [`ClientEvent`]s, runs them through the
//! [`Client`], folds the view-facing output into the [`App`] and hands the
//! network-facing output back to the runtime as [`Effect`]s.

use ridesync_client::{ApiRequest, Client, ClientAction, ClientEvent};
use ridesync_core::Environment;
use ridesync_proto::OutboundEvent;
use tracing::debug;

use crate::{App, AppAction};

/// Network work requested by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Execute a REST call.
    Api(ApiRequest),
    /// Send a socket event.
    Send(OutboundEvent),
}

/// Owner of the ride client on behalf of the runtime.
#[derive(Debug)]
pub struct Bridge<E: Environment> {
    client: Client<E>,
}

impl<E: Environment> Bridge<E> {
    /// Wrap a client.
    pub fn new(client: Client<E>) -> Self {
        Self { client }
    }

    /// The ride client.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Client event for an app action.
    ///
    /// `None` for actions the runtime handles itself (connectivity, quit).
    pub fn client_event(action: AppAction) -> Option<ClientEvent> {
        let event = match action {
            AppAction::RequestRide { pickup, dropoff, vehicle } => {
                ClientEvent::RequestRide { pickup, dropoff, vehicle }
            },
            AppAction::AcceptRide { ride_id } => ClientEvent::AcceptRide { ride_id },
            AppAction::RejectOffer { ride_id } => ClientEvent::RejectOffer { ride_id },
            AppAction::StartRide => ClientEvent::StartRide,
            AppAction::CompleteRide => ClientEvent::CompleteRide,
            AppAction::CancelRide => ClientEvent::CancelRide,
            AppAction::ResetSession => ClientEvent::Reset,
            AppAction::UpdateLocation(point) => ClientEvent::LocationChanged(point),
            AppAction::LocationFailed { reason } => ClientEvent::LocationUnavailable { reason },
            AppAction::Quit | AppAction::Connect | AppAction::Disconnect => return None,
        };
        Some(event)
    }

    /// Run one event through the client.
    ///
    /// Local refusals become notices on the app; nothing is returned for
    /// them.
    pub fn handle(&mut self, app: &mut App, event: ClientEvent) -> Vec<Effect> {
        let actions = match self.client.handle(event) {
            Ok(actions) => actions,
            Err(err) => {
                debug!(error = %err, "client refused action");
                app.on_client_error(&err);
                return Vec::new();
            },
        };

        let mut effects = Vec::new();
        for action in actions {
            match action {
                ClientAction::Api(request) => effects.push(Effect::Api(request)),
                ClientAction::Send(event) => effects.push(Effect::Send(event)),
                other => {
                    app.apply(&other);
                },
            }
        }
        effects
    }
}
