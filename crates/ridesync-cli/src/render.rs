//! Plain-text rendering of the application state.
//!
//! [`render`] is pure so the layout can be snapshot-tested; the stdio driver
//! only writes the result to stdout.

use ridesync_app::{App, NoticeLevel};
use ridesync_core::{Counterparty, Metrics, Progress, SessionSnapshot};
use ridesync_proto::{Location, RidePayload, Role};

/// Render the whole view, one item per line, without a trailing newline.
pub fn render(app: &App) -> String {
    let mut lines = Vec::new();
    let banner = app.banner().unwrap_or_else(|| "online".to_string());
    lines.push(format!("[{}] {banner}", app.role()));

    match app.session().filter(|s| s.ride_id.is_some() || s.status.is_active()) {
        Some(session) => session_lines(session, app.role(), &mut lines),
        None => lines.push("no active ride".to_string()),
    }
    if let Some(progress) = app.progress() {
        lines.push(progress_line(progress));
    }

    if !app.offers().is_empty() {
        lines.push("offers:".to_string());
        lines.extend(app.offers().iter().map(offer_line));
    }

    let mut notices = app.notices().peekable();
    if notices.peek().is_some() {
        lines.push("notices:".to_string());
        for notice in notices {
            let level = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            lines.push(format!("  {level}: {}", notice.text));
        }
    }

    lines.join("\n")
}

fn point(location: &Location) -> String {
    format!("{:.4},{:.4}", location.lat, location.lng)
}

fn session_lines(session: &SessionSnapshot, role: Role, lines: &mut Vec<String>) {
    match &session.ride_id {
        Some(id) => lines.push(format!("ride {id}: {}", session.status)),
        None => lines.push(format!("ride: {}", session.status)),
    }
    if let (Some(pickup), Some(dropoff)) = (&session.pickup, &session.dropoff) {
        lines.push(format!("  route {} -> {}", point(pickup), point(dropoff)));
    }
    if let Some(vehicle) = session.vehicle {
        lines.push(format!("  vehicle {vehicle}"));
    }
    if let Some(party) = &session.counterparty {
        let label = match role {
            Role::Rider => "driver",
            Role::Driver => "rider",
        };
        lines.push(format!("  {label} {}", party_line(party)));
    }
    if let Some(metrics) = metrics_line(&session.metrics) {
        lines.push(format!("  {metrics}"));
    }
    if let Some(at) = session.driver_location {
        lines.push(format!("  driver at {:.4},{:.4}", at.lat, at.lng));
    }
    if let Some(reason) = &session.cancel_reason {
        lines.push(format!("  {reason}"));
    }
    if let Some(failure) = &session.failure {
        lines.push(format!("  {failure}"));
    }
}

fn party_line(party: &Counterparty) -> String {
    let mut parts = vec![party.name.clone().unwrap_or_else(|| party.id.clone())];
    if let Some(rating) = party.rating {
        parts.push(format!("rating {rating:.1}"));
    }
    if let Some(phone) = &party.phone {
        parts.push(phone.clone());
    }
    if let Some(vehicle) = &party.vehicle {
        let details: Vec<&str> = [&vehicle.color, &vehicle.model, &vehicle.plate]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .collect();
        if !details.is_empty() {
            parts.push(details.join(" "));
        }
    }
    parts.join(", ")
}

fn metrics_line(metrics: &Metrics) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(fare) = metrics.fare() {
        parts.push(format!("fare {fare:.2}"));
    }
    if let Some(km) = metrics.distance_km() {
        parts.push(format!("distance {km:.1} km"));
    }
    if let Some(eta) = metrics.eta_minutes() {
        parts.push(format!("eta {eta:.1} min"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn progress_line(progress: &Progress) -> String {
    let mut parts = vec![
        format!("  progress {:.1} km", progress.distance_covered_km),
        format!("fare {:.2}", progress.fare_accrued),
    ];
    if let Some(eta) = progress.eta_remaining_minutes {
        parts.push(format!("eta {eta:.1} min"));
    }
    parts.push(format!("{}s elapsed", progress.elapsed.as_secs()));
    parts.join(", ")
}

fn offer_line(offer: &RidePayload) -> String {
    let mut parts = vec![format!("  {}", offer.id)];
    if let (Some(pickup), Some(dropoff)) = (&offer.pickup_location, &offer.dropoff_location) {
        parts.push(format!("{} -> {}", point(pickup), point(dropoff)));
    }
    if let Some(fare) = offer.fare {
        parts.push(format!("fare {fare:.2}"));
    }
    if let Some(km) = offer.distance {
        parts.push(format!("{km:.1} km"));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ridesync_client::ClientAction;
    use ridesync_core::{CancelReason, ConnectionState, RideSession, RideStatus, VehicleClass};
    use ridesync_proto::{RideId, VehicleInfo};

    use super::*;

    fn snapshot(role: Role) -> SessionSnapshot {
        RideSession::new(role).snapshot()
    }

    #[test]
    fn fresh_rider_is_offline_and_idle() {
        let app = App::new(Role::Rider);
        insta::assert_snapshot!(render(&app), @r"
        [rider] offline
        no active ride
        ");
    }

    #[test]
    fn matched_rider_shows_driver_and_progress() {
        let mut app = App::new(Role::Rider);
        app.on_connection(ConnectionState::Connected);
        let session = SessionSnapshot {
            ride_id: Some(RideId::new("r1")),
            status: RideStatus::Accepted,
            pickup: Some(Location::new(28.6139, 77.209)),
            dropoff: Some(Location::new(28.4595, 77.0266)),
            vehicle: Some(VehicleClass::Comfort),
            counterparty: Some(Counterparty {
                id: "d1".to_string(),
                name: Some("Asha".to_string()),
                phone: None,
                rating: Some(4.9),
                vehicle: Some(VehicleInfo {
                    model: Some("Swift".to_string()),
                    plate: Some("KA01".to_string()),
                    color: None,
                }),
            }),
            metrics: Metrics::authoritative(Some(180.0), Some(12.5), Some(5.0)),
            ..snapshot(Role::Rider)
        };
        app.apply(&ClientAction::SessionChanged(session));
        app.apply(&ClientAction::ProgressChanged(Progress {
            phase: RideStatus::Accepted,
            elapsed: Duration::from_secs(30),
            distance_covered_km: 0.0,
            fare_accrued: 0.0,
            eta_remaining_minutes: Some(4.5),
        }));

        insta::assert_snapshot!(render(&app), @r"
        [rider] online
        ride r1: accepted
          route 28.6139,77.2090 -> 28.4595,77.0266
          vehicle comfort
          driver Asha, rating 4.9, Swift KA01
          fare 180.00, distance 12.5 km, eta 5.0 min
          progress 0.0 km, fare 0.00, eta 4.5 min, 30s elapsed
        notices:
          info: matched with Asha
        ");
    }

    #[test]
    fn connecting_driver_lists_offers() {
        let mut app = App::new(Role::Driver);
        app.on_connection(ConnectionState::Connecting);
        let offer = RidePayload::new("r9")
            .with_route(Location::new(12.97, 77.59), Location::new(13.0, 77.6))
            .with_fare(150.0, 8.2);
        app.apply(&ClientAction::OfferAvailable(offer));

        insta::assert_snapshot!(render(&app), @r"
        [driver] connecting...
        no active ride
        offers:
          r9, 12.9700,77.5900 -> 13.0000,77.6000, fare 150.00, 8.2 km
        ");
    }

    #[test]
    fn cancelled_ride_shows_the_reason() {
        let mut app = App::new(Role::Driver);
        app.on_connection(ConnectionState::Connected);
        let session = SessionSnapshot {
            ride_id: Some(RideId::new("r4")),
            status: RideStatus::Cancelled,
            cancel_reason: Some(CancelReason::TakenByOther),
            ..snapshot(Role::Driver)
        };
        app.apply(&ClientAction::SessionChanged(session));

        insta::assert_snapshot!(render(&app), @r"
        [driver] online
        ride r4: cancelled
          taken by another driver
        notices:
          info: ride cancelled: taken by another driver
        ");
    }
}
