//! Command parsing for line-based interfaces.
//!
//! This module parses command strings into structured [`Command`] values.

use ridesync_app::AppEvent;
use ridesync_core::VehicleClass;
use ridesync_proto::{GeoPoint, Location, RideId};

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Request a ride.
    Request {
        /// Pickup point.
        pickup: GeoPoint,
        /// Drop-off point.
        dropoff: GeoPoint,
        /// Vehicle class, `uberx` when omitted.
        vehicle: VehicleClass,
    },

    /// Accept an offer.
    Accept {
        /// Offered ride.
        ride_id: RideId,
    },

    /// Decline an offer.
    Reject {
        /// Offered ride.
        ride_id: RideId,
    },

    /// Start the accepted trip.
    Start,

    /// Complete the running trip.
    Complete,

    /// Cancel the active ride.
    Cancel,

    /// Dismiss a finished ride.
    Dismiss,

    /// Report a location fix.
    Location(GeoPoint),

    /// Report a geolocation failure.
    LocationError {
        /// Why the fix failed.
        reason: String,
    },

    /// Open the socket.
    Connect,

    /// Close the socket.
    Disconnect,

    /// Quit the application.
    Quit,

    /// Blank line.
    Empty,

    /// Unknown or invalid command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

impl Command {
    /// The application event this command stands for.
    ///
    /// `None` for input that is handled locally (blank lines, parse errors).
    pub fn into_event(self) -> Option<AppEvent> {
        let event = match self {
            Self::Request { pickup, dropoff, vehicle } => AppEvent::RequestRide {
                pickup: Location::new(pickup.lat, pickup.lng),
                dropoff: Location::new(dropoff.lat, dropoff.lng),
                vehicle,
            },
            Self::Accept { ride_id } => AppEvent::AcceptOffer { ride_id },
            Self::Reject { ride_id } => AppEvent::RejectOffer { ride_id },
            Self::Start => AppEvent::StartRide,
            Self::Complete => AppEvent::CompleteRide,
            Self::Cancel => AppEvent::CancelRide,
            Self::Dismiss => AppEvent::Dismiss,
            Self::Location(point) => AppEvent::LocationFix(point),
            Self::LocationError { reason } => AppEvent::LocationError(reason),
            Self::Connect => AppEvent::Connect,
            Self::Disconnect => AppEvent::Disconnect,
            Self::Quit => AppEvent::Quit,
            Self::Empty | Self::Unknown { .. } | Self::InvalidArgs { .. } => return None,
        };
        Some(event)
    }
}

/// Parse a `lat,lng` pair.
fn parse_point(text: &str) -> Option<GeoPoint> {
    let (lat, lng) = text.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    let valid = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng);
    valid.then(|| GeoPoint::new(lat, lng))
}

fn invalid(command: &str, error: impl Into<String>) -> Command {
    Command::InvalidArgs { command: command.into(), error: error.into() }
}

/// Parse a user input string into a command.
///
/// Commands start with `/`. Anything else is unknown.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Empty;
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Unknown { input: input.to_string() };
    };

    let parts: Vec<&str> = cmd_str.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");

    match command {
        "request" => {
            let (Some(from), Some(to)) = (parts.get(1), parts.get(2)) else {
                return invalid("request", "Usage: /request <lat>,<lng> <lat>,<lng> [class]");
            };
            let (Some(pickup), Some(dropoff)) = (parse_point(from), parse_point(to)) else {
                return invalid("request", "Invalid coordinates");
            };
            match parts.get(3).map_or(Ok(VehicleClass::UberX), |class| class.parse()) {
                Ok(vehicle) => Command::Request { pickup, dropoff, vehicle },
                Err(err) => invalid("request", err.to_string()),
            }
        },

        "accept" => match parts.get(1) {
            Some(id) => Command::Accept { ride_id: RideId::new(*id) },
            None => invalid("accept", "Usage: /accept <ride_id>"),
        },

        "reject" => match parts.get(1) {
            Some(id) => Command::Reject { ride_id: RideId::new(*id) },
            None => invalid("reject", "Usage: /reject <ride_id>"),
        },

        "start" => Command::Start,

        "complete" => Command::Complete,

        "cancel" => Command::Cancel,

        "dismiss" => Command::Dismiss,

        "location" => match parts.get(1) {
            Some(text) => match parse_point(text) {
                Some(point) => Command::Location(point),
                None => invalid("location", "Invalid coordinates"),
            },
            None => invalid("location", "Usage: /location <lat>,<lng>"),
        },

        "location-error" => {
            if parts.len() < 2 {
                return invalid("location-error", "Usage: /location-error <reason>");
            }
            Command::LocationError { reason: parts[1..].join(" ") }
        },

        "connect" => Command::Connect,

        "disconnect" => Command::Disconnect,

        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request() {
        assert_eq!(
            parse("/request 28.61,77.20 28.45,77.02 comfort"),
            Command::Request {
                pickup: GeoPoint::new(28.61, 77.20),
                dropoff: GeoPoint::new(28.45, 77.02),
                vehicle: VehicleClass::Comfort,
            }
        );
    }

    #[test]
    fn parse_request_defaults_to_uberx() {
        assert!(matches!(
            parse("/request 1,2 3,4"),
            Command::Request { vehicle: VehicleClass::UberX, .. }
        ));
    }

    #[test]
    fn parse_request_missing_dropoff() {
        assert!(
            matches!(parse("/request 1,2"), Command::InvalidArgs { command, .. } if command == "request")
        );
    }

    #[test]
    fn parse_request_bad_class() {
        let Command::InvalidArgs { error, .. } = parse("/request 1,2 3,4 rickshaw") else {
            panic!("expected invalid args");
        };
        assert!(error.contains("rickshaw"));
    }

    #[test]
    fn parse_request_out_of_range() {
        assert!(matches!(parse("/request 91,0 3,4"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_accept() {
        assert_eq!(parse("/accept ride-7"), Command::Accept { ride_id: RideId::new("ride-7") });
    }

    #[test]
    fn parse_accept_missing_id() {
        assert!(
            matches!(parse("/accept"), Command::InvalidArgs { command, .. } if command == "accept")
        );
    }

    #[test]
    fn parse_reject() {
        assert_eq!(parse("/reject r2"), Command::Reject { ride_id: RideId::new("r2") });
    }

    #[test]
    fn parse_lifecycle() {
        assert_eq!(parse("/start"), Command::Start);
        assert_eq!(parse("/complete"), Command::Complete);
        assert_eq!(parse("/cancel"), Command::Cancel);
        assert_eq!(parse("/dismiss"), Command::Dismiss);
    }

    #[test]
    fn parse_location() {
        assert_eq!(parse("/location 12.5, 77.1"), Command::InvalidArgs {
            command: "location".into(),
            error: "Invalid coordinates".into(),
        });
        assert_eq!(parse("/location 12.5,77.1"), Command::Location(GeoPoint::new(12.5, 77.1)));
    }

    #[test]
    fn parse_location_error_keeps_spaces() {
        assert_eq!(parse("/location-error permission denied"), Command::LocationError {
            reason: "permission denied".into()
        });
    }

    #[test]
    fn parse_quit() {
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/q"), Command::Quit);
    }

    #[test]
    fn parse_unknown_command() {
        assert!(matches!(parse("/unknown"), Command::Unknown { .. }));
        assert!(matches!(parse("hello"), Command::Unknown { .. }));
    }

    #[test]
    fn parse_empty() {
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn request_becomes_app_event() {
        let event = parse("/request 1,2 3,4 xl").into_event();
        assert_eq!(
            event,
            Some(AppEvent::RequestRide {
                pickup: Location::new(1.0, 2.0),
                dropoff: Location::new(3.0, 4.0),
                vehicle: VehicleClass::Xl,
            })
        );
        assert_eq!(parse("/nope").into_event(), None);
    }
}
