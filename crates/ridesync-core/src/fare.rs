//! Fare and ETA estimation.
//!
//! Estimates are cosmetic: they pre-fill a request before the backend
//! answers. Backend values always take precedence (see
//! [`crate::ride::Metrics::merge`]).

use std::{fmt, str::FromStr};

use ridesync_proto::GeoPoint;

/// Mean earth radius used by [`haversine_km`].
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Vehicle class offered to riders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleClass {
    /// Everyday hatchback or sedan.
    UberX,
    /// Newer cars with extra legroom.
    Comfort,
    /// Six-seaters.
    Xl,
    /// Premium cars.
    Black,
}

impl VehicleClass {
    /// All classes, cheapest first.
    pub const ALL: [Self; 4] = [Self::UberX, Self::Comfort, Self::Xl, Self::Black];

    /// Wire name (`vehicleType`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UberX => "uberx",
            Self::Comfort => "comfort",
            Self::Xl => "xl",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised vehicle class name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown vehicle class `{0}`")]
pub struct UnknownVehicleClass(pub String);

impl FromStr for VehicleClass {
    type Err = UnknownVehicleClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uberx" | "x" => Ok(Self::UberX),
            "comfort" => Ok(Self::Comfort),
            "xl" | "uberxl" => Ok(Self::Xl),
            "black" => Ok(Self::Black),
            _ => Err(UnknownVehicleClass(s.to_string())),
        }
    }
}

/// Fare and ETA for a trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    /// Fare, rounded to two decimals.
    pub fare: f64,
    /// Minutes to destination at average speed.
    pub eta_minutes: f64,
}

/// Pure fare function. Must be side-effect free.
pub trait FareEstimator {
    /// Quote a trip of `distance_km` in `class`.
    fn quote(&self, distance_km: f64, class: VehicleClass) -> Quote;
}

/// Base + per-kilometre tariff for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    /// Flat charge.
    pub base: f64,
    /// Charge per kilometre.
    pub per_km: f64,
}

/// Standard tariff table.
#[derive(Debug, Clone, PartialEq)]
pub struct FareTable {
    /// UberX tariff.
    pub uberx: Tariff,
    /// Comfort tariff.
    pub comfort: Tariff,
    /// XL tariff.
    pub xl: Tariff,
    /// Black tariff.
    pub black: Tariff,
    /// Average speed for ETA, km/h.
    pub average_speed_kmh: f64,
}

impl Default for FareTable {
    fn default() -> Self {
        Self {
            uberx: Tariff { base: 35.0, per_km: 12.0 },
            comfort: Tariff { base: 40.0, per_km: 16.0 },
            xl: Tariff { base: 45.0, per_km: 18.0 },
            black: Tariff { base: 90.0, per_km: 25.0 },
            average_speed_kmh: 35.0,
        }
    }
}

impl FareTable {
    /// Tariff for a class.
    pub fn tariff(&self, class: VehicleClass) -> Tariff {
        match class {
            VehicleClass::UberX => self.uberx,
            VehicleClass::Comfort => self.comfort,
            VehicleClass::Xl => self.xl,
            VehicleClass::Black => self.black,
        }
    }
}

impl FareEstimator for FareTable {
    fn quote(&self, distance_km: f64, class: VehicleClass) -> Quote {
        let distance_km = distance_km.max(0.0);
        let tariff = self.tariff(class);
        let fare = round_cents(tariff.base + tariff.per_km * distance_km);
        let eta_minutes = if self.average_speed_kmh > 0.0 {
            (distance_km / self.average_speed_kmh * 60.0).round()
        } else {
            0.0
        };
        Quote { fare, eta_minutes }
    }
}

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
