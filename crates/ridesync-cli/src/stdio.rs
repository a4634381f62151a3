//! Stdin/stdout driver over real transports.
//!
//! Every completion (socket lifecycle, frames, REST responses, typed
//! commands) is funnelled through one unbounded channel, so
//! [`Driver::poll_events`] sees them in arrival order. Sockets and REST
//! calls run on spawned tasks; stdin is read on a plain thread because a
//! blocking read would otherwise hold up runtime shutdown.

use std::{
    future::Future,
    io::{self, BufRead, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use ridesync_app::{App, AppEvent, Driver, DriverEvent};
use ridesync_client::{
    ApiRequest, RideApi,
    transport::{self, HttpApi, SocketMessage},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    commands::{self, Command},
    render::render,
};

/// Errors from [`StdioDriver`].
#[derive(Debug, thiserror::Error)]
pub enum StdioError {
    /// Writing to stdout failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame sent without an open socket.
    #[error("socket not connected")]
    NotConnected,

    /// Every event source went away.
    #[error("event channel closed")]
    Closed,
}

/// Open socket: the writer queue and the task pumping both directions.
#[derive(Debug)]
struct Socket {
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
    /// Set once the handshake completed.
    connected: Arc<AtomicBool>,
}

/// Production driver for the `ridesync` binary.
#[derive(Debug)]
pub struct StdioDriver {
    api: Arc<HttpApi>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    socket: Option<Socket>,
}

impl StdioDriver {
    /// Driver issuing REST calls through `api`.
    pub fn new(api: HttpApi) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self { api: Arc::new(api), events_tx, events_rx, socket: None }
    }

    /// Start reading commands from stdin.
    ///
    /// End of input quits the application.
    pub fn spawn_stdin(&self) -> io::Result<()> {
        let events = self.events_tx.clone();
        std::thread::Builder::new().name("stdin".to_string()).spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let event = match commands::parse(&line) {
                    Command::Empty => continue,
                    Command::Unknown { input } => {
                        say(&format!("unknown command: {input}"));
                        continue;
                    },
                    Command::InvalidArgs { command, error } => {
                        say(&format!("/{command}: {error}"));
                        continue;
                    },
                    command => command.into_event(),
                };
                if let Some(event) = event {
                    if events.send(DriverEvent::Input(event)).is_err() {
                        return;
                    }
                }
            }
            debug!("stdin closed");
            let _ = events.send(DriverEvent::Input(AppEvent::Quit));
        })?;
        Ok(())
    }

    fn drop_socket(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        if socket.connected.load(Ordering::Acquire) {
            // Dropping the queue makes the task close the socket and exit.
            drop(socket.outbound);
            debug!(finished = socket.task.is_finished(), "socket released");
        } else {
            // Still inside the handshake, which never looks at the queue.
            socket.task.abort();
            debug!("pending socket connect aborted");
        }
    }
}

fn say(line: &str) {
    if let Err(err) = writeln!(io::stdout().lock(), "{line}") {
        warn!(error = %err, "stdout write failed");
    }
}

async fn pump_socket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<DriverEvent>,
    connected: Arc<AtomicBool>,
) {
    let (mut writer, mut reader) = match transport::connect(&url).await {
        Ok(halves) => halves,
        Err(err) => {
            warn!(error = %err, "socket connect failed");
            let code = err.auth_close_code();
            let _ = events.send(DriverEvent::ConnectFailed { reason: err.to_string(), code });
            return;
        },
    };
    connected.store(true, Ordering::Release);
    if events.send(DriverEvent::Connected).is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = writer.send(frame).await {
                        warn!(error = %err, "socket send failed");
                        let _ = events.send(DriverEvent::Closed { code: None });
                        return;
                    }
                },
                None => {
                    writer.close().await;
                    return;
                },
            },
            message = reader.next() => match message {
                SocketMessage::Frame(raw) => {
                    if events.send(DriverEvent::Frame(raw)).is_err() {
                        return;
                    }
                },
                SocketMessage::Closed { code, reason } => {
                    info!(?code, %reason, "socket closed by peer");
                    let _ = events.send(DriverEvent::Closed { code });
                    return;
                },
            },
        }
    }
}

impl Driver for StdioDriver {
    type Error = StdioError;

    fn poll_events(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<DriverEvent>, Self::Error>> + Send {
        async move {
            let first = match tokio::time::timeout(timeout, self.events_rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(StdioError::Closed),
                Err(_) => return Ok(Vec::new()),
            };
            let mut events = vec![first];
            while let Ok(event) = self.events_rx.try_recv() {
                events.push(event);
            }
            Ok(events)
        }
    }

    fn connect(&mut self, url: &str) {
        self.drop_socket();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(pump_socket(
            url.to_string(),
            outbound_rx,
            self.events_tx.clone(),
            Arc::clone(&connected),
        ));
        self.socket = Some(Socket { outbound, task, connected });
    }

    fn disconnect(&mut self) {
        self.drop_socket();
    }

    fn send_frame(&mut self, frame: String) -> Result<(), Self::Error> {
        let socket = self.socket.as_ref().ok_or(StdioError::NotConnected)?;
        socket.outbound.send(frame).map_err(|_| StdioError::NotConnected)
    }

    fn execute(&mut self, request: ApiRequest) {
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let ApiRequest { id, call } = request;
            let result = api.execute(call).await;
            let _ = events.send(DriverEvent::ApiResponse { request_id: id, result });
        });
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}\n", render(app))?;
        stdout.flush()?;
        Ok(())
    }

    fn stop(&mut self) {
        self.drop_socket();
    }
}

#[cfg(test)]
mod tests {
    use ridesync_client::{ApiCall, ApiError, RequestId};
    use tokio::{io::AsyncReadExt, net::TcpListener};

    use super::*;

    async fn next_events(driver: &mut StdioDriver) -> Vec<DriverEvent> {
        for _ in 0..50 {
            let events = driver.poll_events(Duration::from_millis(100)).await.unwrap();
            if !events.is_empty() {
                return events;
            }
        }
        Vec::new()
    }

    #[test]
    fn send_without_socket_fails() {
        let mut driver = StdioDriver::new(HttpApi::new("http://127.0.0.1:9", "t"));
        assert!(matches!(driver.send_frame("{}".into()), Err(StdioError::NotConnected)));
    }

    #[tokio::test]
    async fn empty_poll_times_out() {
        let mut driver = StdioDriver::new(HttpApi::new("http://127.0.0.1:9", "t"));
        let events = driver.poll_events(Duration::from_millis(10)).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn unreachable_socket_reports_connect_failure() {
        let mut driver = StdioDriver::new(HttpApi::new("http://127.0.0.1:9", "t"));
        driver.connect("ws://127.0.0.1:9/ws?token=t");

        let events = next_events(&mut driver).await;
        assert!(matches!(events.as_slice(), [DriverEvent::ConnectFailed { code: None, .. }]));
    }

    #[tokio::test]
    async fn disconnect_abandons_a_stalled_handshake() {
        // Accepts TCP but never answers the upgrade request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut driver = StdioDriver::new(HttpApi::new("http://127.0.0.1:9", "t"));
        driver.connect(&format!("ws://{addr}/ws?token=t"));

        let (mut stream, _) = listener.accept().await.unwrap();
        driver.disconnect();

        let mut buf = [0u8; 1024];
        let released = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {},
                }
            }
        })
        .await;
        assert!(released.is_ok(), "socket task still holds the connection");
        assert!(driver.poll_events(Duration::from_millis(50)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rest_failure_comes_back_as_response() {
        let mut driver = StdioDriver::new(HttpApi::new("http://127.0.0.1:9", "t"));
        driver.execute(ApiRequest { id: RequestId(7), call: ApiCall::FetchOffers });

        let events = next_events(&mut driver).await;
        let [DriverEvent::ApiResponse { request_id, result }] = events.as_slice() else {
            panic!("expected one response, got {events:?}");
        };
        assert_eq!(*request_id, RequestId(7));
        assert!(matches!(result, Err(ApiError::Network(_))));
    }
}
