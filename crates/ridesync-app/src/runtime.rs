//! Generic orchestration loop.
//!
//! [`Runtime`] is the single owner of the transport [`Channel`], the
//! [`EventRouter`] and (through the [`Bridge`]) the ride client. Everything
//! the [`Driver`] reports is applied in receipt order; everything the state
//! machines ask for is executed through the driver.

use std::time::Duration;

use ridesync_client::{Client, ClientConfig, ClientEvent};
use ridesync_core::{
    Channel, ChannelAction, ChannelConfig, ChannelError, Environment, EventRouter, EventSink,
    SubscriptionId,
};
use ridesync_proto::Role;
use tracing::{debug, info, warn};

use crate::{App, AppAction, Bridge, Driver, DriverEvent, Effect};

/// Who we are to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Auth token for the socket and REST calls.
    pub token: String,
    /// Session role.
    pub role: Role,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Longest a single step waits for driver events.
    pub poll_timeout: Duration,
    /// Transport channel settings.
    pub channel: ChannelConfig,
    /// Client settings.
    pub client: ClientConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            channel: ChannelConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// Runtime failure.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The driver failed.
    #[error("driver error: {0}")]
    Driver(#[source] E),

    /// The channel could not be opened.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Orchestrates App, Bridge, Channel and Router over a [`Driver`].
pub struct Runtime<D: Driver, E: Environment> {
    driver: D,
    app: App,
    bridge: Bridge<E>,
    channel: Channel,
    router: EventRouter,
    credentials: Credentials,
    config: RuntimeConfig,
}

impl<D: Driver, E: Environment> std::fmt::Debug for Runtime<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("role", &self.credentials.role)
            .field("status", &self.app.status())
            .field("connection", &self.channel.state())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl<D: Driver, E: Environment> Runtime<D, E> {
    /// Runtime for `credentials`, with a client on `env`.
    pub fn new(driver: D, env: E, credentials: Credentials, config: RuntimeConfig) -> Self {
        let client = Client::new(env, credentials.role, config.client.clone());
        Self {
            driver,
            app: App::new(credentials.role),
            bridge: Bridge::new(client),
            channel: Channel::new(config.channel.clone()),
            router: EventRouter::new(),
            credentials,
            config,
        }
    }

    /// View state.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// The ride client.
    pub fn client(&self) -> &Client<E> {
        self.bridge.client()
    }

    /// The transport channel.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The event router.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable driver access, for tests that inject events.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Receive every decoded socket event after the client has applied it.
    pub fn subscribe(&mut self, sink: impl EventSink + 'static) -> SubscriptionId {
        self.router.subscribe(sink)
    }

    /// Open the channel for our token. Idempotent.
    ///
    /// # Errors
    ///
    /// `Channel` if the channel is open for another token.
    pub fn open(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let now = self.driver.now();
        let (handle, actions) = self.channel.open(&self.credentials.token, now)?;
        debug!(handle = handle.id(), "channel open");
        self.execute_channel(actions);
        Ok(())
    }

    /// Run until the user quits or the backend rejects our credentials.
    ///
    /// # Errors
    ///
    /// Driver failures end the loop.
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        info!(role = %self.credentials.role, "runtime starting");
        self.open()?;
        self.driver.render(&self.app).map_err(RuntimeError::Driver)?;

        let result = loop {
            if self.app.should_quit() || self.app.auth_failed() {
                break Ok(());
            }
            if let Err(err) = self.step().await {
                break Err(err);
            }
        };

        let actions = self.channel.close();
        self.execute_channel(actions);
        self.driver.stop();
        info!(auth_failed = self.app.auth_failed(), "runtime stopped");
        result
    }

    /// One loop iteration: poll, apply, tick, render.
    ///
    /// # Errors
    ///
    /// Driver failures.
    pub async fn step(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let events =
            self.driver.poll_events(self.config.poll_timeout).await.map_err(RuntimeError::Driver)?;
        for event in events {
            self.process(event)?;
        }

        let now = self.driver.now();
        let actions = self.channel.tick(now);
        self.execute_channel(actions);
        self.to_client(ClientEvent::Tick);

        if self.app.take_dirty() {
            self.driver.render(&self.app).map_err(RuntimeError::Driver)?;
        }
        Ok(())
    }

    /// Apply one driver event.
    ///
    /// # Errors
    ///
    /// `Channel` when a connect request conflicts with the open channel.
    pub fn process(&mut self, event: DriverEvent) -> Result<(), RuntimeError<D::Error>> {
        let now = self.driver.now();
        match event {
            DriverEvent::Input(input) => {
                for action in self.app.handle(input) {
                    self.process_app_action(action)?;
                }
            },
            DriverEvent::Frame(raw) => {
                // Decode failures are logged by the router.
                if let Ok(routed) = self.router.decode(&raw) {
                    self.to_client(ClientEvent::Socket(routed.clone()));
                    self.router.dispatch(&routed);
                }
            },
            DriverEvent::Connected => {
                let actions = self.channel.on_connected(now);
                self.execute_channel(actions);
            },
            DriverEvent::ConnectFailed { reason, code } => {
                let actions = match code {
                    Some(code) => self.channel.on_closed(Some(code), now),
                    None => self.channel.on_connect_failed(&reason, now),
                };
                self.execute_channel(actions);
            },
            DriverEvent::Closed { code } => {
                let actions = self.channel.on_closed(code, now);
                self.execute_channel(actions);
            },
            DriverEvent::ApiResponse { request_id, result } => {
                self.to_client(ClientEvent::ApiResponse { request_id, result });
            },
        }
        Ok(())
    }

    fn process_app_action(&mut self, action: AppAction) -> Result<(), RuntimeError<D::Error>> {
        match action {
            AppAction::Quit => debug!("quit requested"),
            AppAction::Connect => self.open()?,
            AppAction::Disconnect => {
                let actions = self.channel.close();
                self.execute_channel(actions);
            },
            other => {
                if let Some(event) = Bridge::<E>::client_event(other) {
                    self.to_client(event);
                }
            },
        }
        Ok(())
    }

    fn to_client(&mut self, event: ClientEvent) {
        let effects = self.bridge.handle(&mut self.app, event);
        for effect in effects {
            match effect {
                Effect::Api(request) => {
                    debug!(request = %request.id, call = request.call.name(), "executing api call");
                    self.driver.execute(request);
                },
                Effect::Send(event) => match self.channel.send(&event) {
                    Ok(ChannelAction::SendFrame(frame)) => self.send_frame(frame),
                    Ok(other) => self.execute_channel(vec![other]),
                    Err(err) => warn!(event = event.name(), error = %err, "outbound event not sent"),
                },
            }
        }
    }

    fn execute_channel(&mut self, actions: Vec<ChannelAction>) {
        for action in actions {
            match action {
                ChannelAction::Connect { url } => self.driver.connect(&url),
                ChannelAction::Disconnect => self.driver.disconnect(),
                ChannelAction::SendFrame(frame) => self.send_frame(frame),
                ChannelAction::StateChanged(state) => {
                    self.app.on_connection(state);
                    self.to_client(ClientEvent::ConnectionChanged(state));
                },
                ChannelAction::Fatal(err) => {
                    warn!(error = %err, "channel gave up");
                    self.app.on_channel_error(err);
                },
            }
        }
    }

    fn send_frame(&mut self, frame: String) {
        if let Err(err) = self.driver.send_frame(frame) {
            warn!(error = %err, "frame send failed");
        }
    }
}
