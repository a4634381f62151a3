//! End-to-end ride scenarios over the simulated backend.
//!
//! 1. Rider request acknowledged as pending
//! 2. Acceptance delivered over the socket
//! 3. Foreign acceptance ignored
//! 4. Offers for other rides queue while a driver is busy
//! 5. Socket drop mid-ride and reconnect
//! 6. Rider cancel racing a driver accept, both orders

use std::time::Duration;

use ridesync_client::{ClientAction, ClientEvent};
use ridesync_core::{Conflict, RideStatus, VehicleClass};
use ridesync_harness::{ParticipantId, SimWorld};
use ridesync_proto::{Location, RideId};

fn request_from(lat: f64, lng: f64) -> ClientEvent {
    ClientEvent::RequestRide {
        pickup: Location::new(lat, lng),
        dropoff: Location::new(28.4595, 77.0266),
        vehicle: VehicleClass::Comfort,
    }
}

fn request() -> ClientEvent {
    request_from(28.6139, 77.2090)
}

fn surfaced_offers(world: &SimWorld, driver: ParticipantId) -> Vec<RideId> {
    world
        .actions(driver)
        .iter()
        .filter_map(|a| match a {
            ClientAction::OfferAvailable(offer) => Some(offer.id.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn request_is_acknowledged_as_pending() {
    let mut world = SimWorld::new(11);
    let rider = world.add_rider("rider");
    world.connect(rider);

    world.act(rider, request()).unwrap();
    assert_eq!(world.session(rider).status, RideStatus::Requesting);
    assert!(world.session(rider).metrics.fare().is_some());

    world.run_until_quiet();
    let session = world.session(rider);
    assert_eq!(session.status, RideStatus::Pending);
    assert_eq!(session.ride_id, Some(RideId::new("ride-1")));
    assert_eq!(session.pickup, Some(Location::new(28.6139, 77.2090)));
}

#[test]
fn socket_acceptance_fills_in_the_driver() {
    let mut world = SimWorld::new(12);
    let rider = world.add_rider("rider");
    let driver = world.add_driver("asha");
    world.connect(rider);
    world.connect(driver);
    world.act(rider, request()).unwrap();
    world.run_until_quiet();

    let ride_id = world.session(rider).ride_id.unwrap();
    world.act(driver, ClientEvent::AcceptRide { ride_id }).unwrap();
    world.run_until_quiet();

    let session = world.session(rider);
    assert_eq!(session.status, RideStatus::Accepted);
    let counterparty = session.counterparty.unwrap();
    assert_eq!(counterparty.id, "asha");
    assert_eq!(counterparty.name.as_deref(), Some("asha"));
    assert!(world.client(rider).clock_running());
}

#[test]
fn foreign_acceptance_is_dropped() {
    let mut world = SimWorld::new(13);
    let rider = world.add_rider("rider");
    let driver = world.add_driver("asha");
    world.connect(rider);
    world.connect(driver);
    world.act(rider, request()).unwrap();
    world.run_until_quiet();
    let ride_id = world.session(rider).ride_id.unwrap();
    world.act(driver, ClientEvent::AcceptRide { ride_id: ride_id.clone() }).unwrap();
    world.run_until_quiet();
    let before = world.session(rider);

    world.inject_frame(
        rider,
        r#"{"event":"ride:accepted","data":{"_id":"r2","driver":{"_id":"d2","name":"Other"}}}"#,
    );
    world.run_until_quiet();

    assert_eq!(world.session(rider), before);
    assert_eq!(world.session(rider).ride_id, Some(ride_id));
    assert!(
        world
            .actions(rider)
            .iter()
            .any(|a| matches!(a, ClientAction::ConflictDropped(Conflict::RideMismatch { .. })))
    );
}

#[test]
fn busy_driver_queues_new_offers() {
    let mut world = SimWorld::new(14);
    let first = world.add_rider("first");
    let second = world.add_rider("second");
    let driver = world.add_driver("asha");
    for who in [first, second, driver] {
        world.connect(who);
    }
    world.run_until_quiet();

    world.act(first, request()).unwrap();
    world.run_until_quiet();
    let accepted = world.session(first).ride_id.unwrap();
    world.act(driver, ClientEvent::AcceptRide { ride_id: accepted.clone() }).unwrap();
    world.run_until_quiet();

    world.act(second, request_from(28.5355, 77.3910)).unwrap();
    world.run_until_quiet();
    let queued = world.session(second).ride_id.unwrap();

    assert_eq!(world.session(driver).ride_id, Some(accepted.clone()));
    assert_eq!(world.session(driver).status, RideStatus::Accepted);
    assert!(world.client(driver).offers().contains(&queued));
    assert_eq!(surfaced_offers(&world, driver), [accepted.clone()]);

    world.act(driver, ClientEvent::StartRide).unwrap();
    world.run_until_quiet();
    world.act(driver, ClientEvent::CompleteRide).unwrap();
    world.run_until_quiet();
    world.act(driver, ClientEvent::Reset).unwrap();

    assert_eq!(world.session(driver).status, RideStatus::Idle);
    assert_eq!(surfaced_offers(&world, driver), [accepted, queued]);
}

#[test]
fn reconnect_mid_ride_keeps_the_trip_running() {
    let mut world = SimWorld::new(15);
    let rider = world.add_rider("rider");
    let driver = world.add_driver("asha");
    world.connect(rider);
    world.connect(driver);
    world.act(rider, request()).unwrap();
    world.run_until_quiet();
    let ride_id = world.session(rider).ride_id.unwrap();
    world.act(driver, ClientEvent::AcceptRide { ride_id }).unwrap();
    world.run_until_quiet();
    world.act(driver, ClientEvent::StartRide).unwrap();
    world.run_until_quiet();

    world.advance(Duration::from_secs(5));
    world.run_until_quiet();
    let before = world.client(rider).progress().unwrap();

    world.disconnect(rider);
    world.advance(Duration::from_secs(3));
    world.run_until_quiet();
    world.connect(rider);
    world.run_until_quiet();

    let mut statuses: Vec<_> = world
        .actions(rider)
        .iter()
        .filter_map(|a| match a {
            ClientAction::SessionChanged(s) => Some(s.status),
            _ => None,
        })
        .collect();
    statuses.dedup();
    assert_eq!(statuses.iter().filter(|s| **s == RideStatus::Started).count(), 1);
    assert_eq!(world.session(rider).status, RideStatus::Started);

    let after = world.client(rider).progress().unwrap();
    assert_eq!(after.phase, RideStatus::Started);
    assert!(after.elapsed > before.elapsed);
    assert!(after.distance_covered_km >= before.distance_covered_km);
}

#[test]
fn missed_completion_is_recovered_on_reconnect() {
    let mut world = SimWorld::new(16);
    let rider = world.add_rider("rider");
    let driver = world.add_driver("asha");
    world.connect(rider);
    world.connect(driver);
    world.act(rider, request()).unwrap();
    world.run_until_quiet();
    let ride_id = world.session(rider).ride_id.unwrap();
    world.act(driver, ClientEvent::AcceptRide { ride_id }).unwrap();
    world.run_until_quiet();

    world.disconnect(rider);
    world.act(driver, ClientEvent::StartRide).unwrap();
    world.run_until_quiet();
    world.act(driver, ClientEvent::CompleteRide).unwrap();
    world.run_until_quiet();
    assert_eq!(world.session(rider).status, RideStatus::Accepted);
    assert_eq!(world.lost(), 2);

    world.connect(rider);
    world.run_until_quiet();
    assert_eq!(world.session(rider).status, RideStatus::Completed);
    assert!(world.client(rider).progress().is_none());
}

#[test]
fn cancel_racing_accept_ends_cancelled() {
    for seed in 0..32 {
        for rider_first in [true, false] {
            let mut world = SimWorld::new(seed);
            let rider = world.add_rider("rider");
            let driver = world.add_driver("asha");
            world.connect(rider);
            world.connect(driver);
            world.act(rider, request()).unwrap();
            world.run_until_quiet();
            let ride_id = world.session(rider).ride_id.unwrap();

            let cancel = ClientEvent::CancelRide;
            let accept = ClientEvent::AcceptRide { ride_id };
            if rider_first {
                world.act(rider, cancel).unwrap();
                world.act(driver, accept).unwrap();
            } else {
                world.act(driver, accept).unwrap();
                world.act(rider, cancel).unwrap();
            }
            world.run_until_quiet_shuffled();

            assert_eq!(world.session(rider).status, RideStatus::Cancelled, "seed {seed}");
            assert_eq!(world.session(driver).status, RideStatus::Cancelled, "seed {seed}");
        }
    }
}

#[test]
fn server_cancel_reaches_both_parties() {
    let mut world = SimWorld::new(17);
    let rider = world.add_rider("rider");
    let driver = world.add_driver("asha");
    world.connect(rider);
    world.connect(driver);
    world.act(rider, request()).unwrap();
    world.run_until_quiet();
    let ride_id = world.session(rider).ride_id.unwrap();
    world.act(driver, ClientEvent::AcceptRide { ride_id: ride_id.clone() }).unwrap();
    world.run_until_quiet();

    world.server_cancel(&ride_id, "driver unavailable");
    world.run_until_quiet();

    for who in [rider, driver] {
        let session = world.session(who);
        assert_eq!(session.status, RideStatus::Cancelled);
        assert!(!world.client(who).clock_running());
    }
}
