//! Socket drop and reconnect over the simulated network.
//!
//! A WebSocket server pushes a ride into `Started`, then vanishes without a
//! close handshake. The channel must reconnect after its backoff on a single
//! new socket, re-register, and the server's replay of `ride:started` must not
//! produce a second transition.

use std::{collections::VecDeque, time::Duration};

use futures::{SinkExt, StreamExt};
use ridesync_client::{ApiReply, Client, ClientAction, ClientConfig, ClientEvent};
use ridesync_core::{
    Channel, ChannelAction, ChannelConfig, ConnectionState, EventRouter, RideStatus, VehicleClass,
};
use ridesync_harness::SimEnv;
use ridesync_proto::{Location, RidePayload, Role, WireStatus};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};
use turmoil::net::{TcpListener, TcpStream};

type Socket = WebSocketStream<TcpStream>;

/// Helper to convert any error to Box<dyn Error>
fn to_box_err<E: std::error::Error + 'static>(e: E) -> Box<dyn std::error::Error> {
    Box::new(e)
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

const ACCEPTED: &str = r#"{"event":"ride:accepted","seq":1,"data":{"_id":"r1","rideStatus":"accepted","driver":{"_id":"d1","name":"Asha"},"distance":12.5,"fare":180}}"#;
const STARTED: &str = r#"{"event":"ride:started","seq":2,"data":{"_id":"r1","rideStatus":"started"}}"#;

async fn expect_register(ws: &mut Socket) -> Result<(), Box<dyn std::error::Error>> {
    match ws.next().await {
        Some(Ok(Message::Text(text))) if text.contains(r#""event":"register""#) => Ok(()),
        other => Err(format!("expected register, got {other:?}").into()),
    }
}

/// Rider client bound to pending ride `r1`.
fn pending_rider() -> Result<Client<SimEnv>, Box<dyn std::error::Error>> {
    let mut client = Client::new(SimEnv::new(), Role::Rider, ClientConfig::default());
    let actions = client.handle(ClientEvent::RequestRide {
        pickup: Location::new(28.6139, 77.2090),
        dropoff: Location::new(28.4595, 77.0266),
        vehicle: VehicleClass::UberX,
    })?;
    let request_id = actions
        .iter()
        .find_map(|a| match a {
            ClientAction::Api(request) => Some(request.id),
            _ => None,
        })
        .ok_or("no request issued")?;
    let ride = RidePayload::new("r1").with_status(WireStatus::Pending);
    client.handle(ClientEvent::ApiResponse { request_id, result: Ok(ApiReply::Ride(ride)) })?;
    assert_eq!(client.session().status(), RideStatus::Pending);
    Ok(client)
}

#[test]
fn reconnect_does_not_repeat_started() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();

    sim.host("server", || async move {
        let listener = TcpListener::bind("0.0.0.0:9000").await?;

        // First socket: drive the ride to started, then drop without closing.
        let (stream, _) = listener.accept().await?;
        let mut ws = tokio_tungstenite::accept_async(stream).await.map_err(to_box_err)?;
        expect_register(&mut ws).await?;
        ws.send(Message::Text(ACCEPTED.to_string())).await.map_err(to_box_err)?;
        ws.send(Message::Text(STARTED.to_string())).await.map_err(to_box_err)?;
        drop(ws);

        // Second socket: replay both, then wait for the client to leave.
        let (stream, _) = listener.accept().await?;
        let mut ws = tokio_tungstenite::accept_async(stream).await.map_err(to_box_err)?;
        expect_register(&mut ws).await?;
        ws.send(Message::Text(STARTED.to_string())).await.map_err(to_box_err)?;
        ws.send(Message::Text(ACCEPTED.to_string())).await.map_err(to_box_err)?;
        while let Some(message) = ws.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        Ok(())
    });

    sim.client("rider", async move {
        let mut client = pending_rider()?;
        let mut router = EventRouter::new();
        let mut channel = Channel::new(ChannelConfig {
            endpoint: "ws://server:9000/ws".to_string(),
            reconnect_backoff: Duration::from_secs(1),
            ..ChannelConfig::default()
        });

        let (_, actions) = channel.open("tok", now()).map_err(to_box_err)?;
        let mut queue: VecDeque<ChannelAction> = actions.into();
        let mut socket: Option<Socket> = None;
        let mut statuses = Vec::new();
        let mut dials = 0;
        let mut replayed = 0;

        while dials < 2 || replayed < 2 {
            while let Some(action) = queue.pop_front() {
                match action {
                    ChannelAction::Connect { url } => {
                        let stream = TcpStream::connect("server:9000").await?;
                        let (ws, _) =
                            tokio_tungstenite::client_async(url, stream).await.map_err(to_box_err)?;
                        socket = Some(ws);
                        dials += 1;
                        queue.extend(channel.on_connected(now()));
                    },
                    ChannelAction::StateChanged(state) => {
                        for action in client.handle(ClientEvent::ConnectionChanged(state))? {
                            if let ClientAction::Send(event) = action {
                                queue.push_back(channel.send(&event).map_err(to_box_err)?);
                            }
                        }
                    },
                    ChannelAction::SendFrame(frame) => {
                        let ws = socket.as_mut().ok_or("send without socket")?;
                        ws.send(Message::Text(frame)).await.map_err(to_box_err)?;
                    },
                    ChannelAction::Disconnect => socket = None,
                    ChannelAction::Fatal(err) => return Err(to_box_err(err)),
                }
            }

            let Some(ws) = socket.as_mut() else {
                tokio::time::sleep(Duration::from_millis(1100)).await;
                queue.extend(channel.tick(now()));
                continue;
            };
            match ws.next().await {
                Some(Ok(Message::Text(raw))) => {
                    if dials == 2 {
                        replayed += 1;
                    }
                    let routed = router.decode(&raw).map_err(to_box_err)?;
                    for action in client.handle(ClientEvent::Socket(routed))? {
                        if let ClientAction::SessionChanged(snapshot) = action {
                            statuses.push(snapshot.status);
                        }
                    }
                },
                Some(Ok(_)) => {},
                Some(Err(_)) | None => {
                    socket = None;
                    queue.extend(channel.on_closed(None, now()));
                },
            }
        }

        assert_eq!(channel.sockets_opened(), 2);
        assert_eq!(channel.state(), ConnectionState::Connected);
        assert_eq!(client.session().status(), RideStatus::Started);
        statuses.dedup();
        assert_eq!(statuses, [RideStatus::Accepted, RideStatus::Started]);

        for action in channel.close() {
            if action == ChannelAction::Disconnect {
                if let Some(mut ws) = socket.take() {
                    ws.close(None).await.map_err(to_box_err)?;
                }
            }
        }
        Ok(())
    });

    sim.run().unwrap();
}
