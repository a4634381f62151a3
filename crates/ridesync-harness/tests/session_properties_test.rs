//! Interleaving properties across riders, drivers and the backend.
//!
//! Every test drives a [`SimWorld`] (or a bare [`Channel`]) with seeded,
//! proptest-chosen schedules. A failing seed reproduces exactly.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use ridesync_client::{ClientConfig, ClientEvent};
use ridesync_core::{
    CancelReason, Channel, ChannelAction, ChannelConfig, ClockConfig, RideStatus, VehicleClass,
};
use ridesync_harness::{ParticipantId, SimWorld};
use ridesync_proto::{Location, RideId};

fn request() -> ClientEvent {
    ClientEvent::RequestRide {
        pickup: Location::new(28.6139, 77.2090),
        dropoff: Location::new(28.4595, 77.0266),
        vehicle: VehicleClass::UberX,
    }
}

/// World with one rider whose request is pending and `drivers` connected
/// drivers holding the offer.
fn pending_world(seed: u64, drivers: usize, config: ClientConfig) -> (SimWorld, ParticipantId, Vec<ParticipantId>, RideId) {
    let mut world = SimWorld::with_config(seed, config);
    let rider = world.add_rider("rider");
    let drivers: Vec<_> = (0..drivers).map(|i| world.add_driver(&format!("driver-{i}"))).collect();
    world.connect(rider);
    for driver in &drivers {
        world.connect(*driver);
    }
    world.run_until_quiet();

    world.act(rider, request()).unwrap();
    world.run_until_quiet();
    let ride_id = world.session(rider).ride_id.unwrap();
    assert_eq!(world.session(rider).status, RideStatus::Pending);
    (world, rider, drivers, ride_id)
}

#[derive(Debug, Clone, Copy)]
enum ChannelOp {
    Open,
    Connected,
    Tick(u64),
}

fn channel_op() -> impl Strategy<Value = ChannelOp> {
    prop_oneof![
        Just(ChannelOp::Open),
        Just(ChannelOp::Connected),
        (0u64..30).prop_map(ChannelOp::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn repeated_open_creates_one_socket(ops in prop::collection::vec(channel_op(), 1..40)) {
        let t0 = Instant::now();
        let mut channel = Channel::new(ChannelConfig::default());
        let mut connects = 0;
        let mut handles = Vec::new();
        let mut now = t0;

        let (handle, actions) = channel.open("token", now).unwrap();
        handles.push(handle);
        connects += actions.iter().filter(|a| matches!(a, ChannelAction::Connect { .. })).count();

        for op in ops {
            let actions = match op {
                ChannelOp::Open => {
                    let (handle, actions) = channel.open("token", now).unwrap();
                    handles.push(handle);
                    actions
                },
                ChannelOp::Connected => channel.on_connected(now),
                ChannelOp::Tick(secs) => {
                    now += Duration::from_secs(secs);
                    channel.tick(now)
                },
            };
            connects += actions.iter().filter(|a| matches!(a, ChannelAction::Connect { .. })).count();
        }

        prop_assert_eq!(connects, 1);
        prop_assert_eq!(channel.sockets_opened(), 1);
        prop_assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn cancellation_beats_acceptance(seed in any::<u64>(), rider_first in any::<bool>()) {
        let (mut world, rider, drivers, ride_id) = pending_world(seed, 1, ClientConfig::default());
        let driver = drivers[0];

        if rider_first {
            world.act(rider, ClientEvent::CancelRide).unwrap();
            world.act(driver, ClientEvent::AcceptRide { ride_id: ride_id.clone() }).unwrap();
        } else {
            world.act(driver, ClientEvent::AcceptRide { ride_id: ride_id.clone() }).unwrap();
            world.act(rider, ClientEvent::CancelRide).unwrap();
        }
        world.run_until_quiet_shuffled();

        prop_assert_eq!(world.session(rider).status, RideStatus::Cancelled);
        prop_assert_eq!(world.session(driver).status, RideStatus::Cancelled);
        prop_assert_eq!(world.session(driver).ride_id, Some(ride_id));
        prop_assert!(!world.client(rider).clock_running());
        prop_assert!(!world.client(driver).clock_running());
    }

    #[test]
    fn one_driver_wins_a_contested_ride(seed in any::<u64>(), drivers in 2usize..5) {
        let (mut world, rider, drivers, ride_id) = pending_world(seed, drivers, ClientConfig::default());

        for driver in &drivers {
            world.act(*driver, ClientEvent::AcceptRide { ride_id: ride_id.clone() }).unwrap();
        }
        world.run_until_quiet_shuffled();

        let winners: Vec<_> = drivers
            .iter()
            .filter(|d| world.session(**d).status == RideStatus::Accepted)
            .collect();
        prop_assert_eq!(winners.len(), 1);

        let winner = world.session(*winners[0]);
        let counterparty = world.session(rider).counterparty.map(|c| c.id);
        prop_assert_eq!(world.session(rider).status, RideStatus::Accepted);
        prop_assert_eq!(counterparty, world.backend().ride(&ride_id).and_then(|r| r.driver_id.clone()));

        for driver in drivers.iter().filter(|d| world.session(**d).status != RideStatus::Accepted) {
            let session = world.session(*driver);
            prop_assert_eq!(session.status, RideStatus::Cancelled);
            prop_assert_eq!(session.cancel_reason, Some(CancelReason::TakenByOther));
        }
        prop_assert_eq!(winner.ride_id, Some(ride_id));
    }

    #[test]
    fn duplicate_accepted_event_is_idempotent(seed in any::<u64>(), with_seq in any::<bool>()) {
        let (mut world, rider, _, ride_id) = pending_world(seed, 0, ClientConfig::default());
        let seq = if with_seq { r#","seq":900"# } else { "" };
        let frame = format!(
            r#"{{"event":"ride:accepted","data":{{"_id":"{ride_id}","rideStatus":"accepted","driver":{{"_id":"d9","name":"Ravi"}}}}{seq}}}"#
        );

        world.inject_frame(rider, frame.clone());
        world.run_until_quiet();
        let once = world.session(rider);
        prop_assert_eq!(once.status, RideStatus::Accepted);

        world.inject_frame(rider, frame);
        world.run_until_quiet();
        prop_assert_eq!(world.session(rider), once);
    }

    #[test]
    fn simulated_distance_stays_bounded(
        seed in any::<u64>(),
        steps in prop::collection::vec(1u64..90, 1..40),
    ) {
        let config = ClientConfig {
            clock: ClockConfig { km_per_tick: 0.5, ..ClockConfig::default() },
            ..ClientConfig::default()
        };
        let (mut world, rider, drivers, ride_id) = pending_world(seed, 1, config);
        let driver = drivers[0];
        world.act(driver, ClientEvent::AcceptRide { ride_id }).unwrap();
        world.run_until_quiet();
        world.act(driver, ClientEvent::StartRide).unwrap();
        world.run_until_quiet();
        prop_assert_eq!(world.session(rider).status, RideStatus::Started);

        let total_km = world.session(rider).metrics.distance_km().unwrap();
        for secs in steps {
            world.advance(Duration::from_secs(secs));
            world.run_until_quiet();
            for who in [rider, driver] {
                let progress = world.client(who).progress().unwrap();
                prop_assert_eq!(progress.phase, RideStatus::Started);
                prop_assert!(progress.distance_covered_km <= total_km + 1e-9);
            }
        }

        world.act(driver, ClientEvent::CompleteRide).unwrap();
        world.run_until_quiet();
        world.advance(Duration::from_secs(60));
        world.run_until_quiet();
        prop_assert_eq!(world.session(rider).status, RideStatus::Completed);
        prop_assert!(world.client(rider).progress().is_none());
        prop_assert!(world.client(driver).progress().is_none());
    }
}
