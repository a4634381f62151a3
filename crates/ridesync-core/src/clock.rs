//! Local simulation clock.
//!
//! Between backend updates the UI shows a ticking ride: elapsed time, a
//! countdown ETA, and (once the trip has started) distance covered and fare
//! accrued. These are presentational only. They move monotonically toward
//! bounds taken from the session's metrics and never pass them.
//!
//! The clock is owned by the client and started/stopped by the same code path
//! that changes the session status, so it cannot outlive `Accepted`/`Started`.

use std::time::{Duration, Instant};

use crate::ride::{Metrics, RideStatus};

/// Clock configuration.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Tick interval.
    pub tick: Duration,
    /// Simulated distance per tick while started, in km.
    pub km_per_tick: f64,
    /// ETA countdown per tick, in minutes.
    pub eta_minutes_per_tick: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(1), km_per_tick: 0.008, eta_minutes_per_tick: 1.0 / 60.0 }
    }
}

/// Upper bounds for the simulated values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    /// Total route distance.
    pub distance_km: Option<f64>,
    /// Total fare.
    pub fare: Option<f64>,
    /// ETA at the last update.
    pub eta_minutes: Option<f64>,
}

impl From<&Metrics> for Bounds {
    fn from(metrics: &Metrics) -> Self {
        Self {
            distance_km: metrics.distance_km(),
            fare: metrics.fare(),
            eta_minutes: metrics.eta_minutes(),
        }
    }
}

/// Derived ride progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Status the clock is running for.
    pub phase: RideStatus,
    /// Time spent in `phase`.
    pub elapsed: Duration,
    /// Simulated distance covered.
    pub distance_covered_km: f64,
    /// Simulated fare so far.
    pub fare_accrued: f64,
    /// Countdown ETA.
    pub eta_remaining_minutes: Option<f64>,
}

impl Progress {
    fn fresh(phase: RideStatus, bounds: Bounds) -> Self {
        Self {
            phase,
            elapsed: Duration::ZERO,
            distance_covered_km: 0.0,
            fare_accrued: 0.0,
            eta_remaining_minutes: bounds.eta_minutes.map(|eta| eta.max(0.0)),
        }
    }
}

#[derive(Debug, Clone)]
struct Running {
    bounds: Bounds,
    next_tick: Instant,
    progress: Progress,
}

/// Tick-driven progress simulator.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    config: ClockConfig,
    running: Option<Running>,
}

impl SimulationClock {
    /// Stopped clock.
    pub fn new(config: ClockConfig) -> Self {
        Self { config, running: None }
    }

    /// Whether the clock is ticking.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Latest progress, while running.
    pub fn progress(&self) -> Option<Progress> {
        self.running.as_ref().map(|r| r.progress)
    }

    /// Start (or re-sync) the clock for `phase`.
    ///
    /// Only `Accepted` and `Started` run the clock; any other phase stops it.
    /// Restarting in the same phase keeps progress and tick schedule and only
    /// re-reads the bounds. Returns whether the clock is running afterwards.
    pub fn start(&mut self, phase: RideStatus, metrics: &Metrics, now: Instant) -> bool {
        if !matches!(phase, RideStatus::Accepted | RideStatus::Started) {
            self.stop();
            return false;
        }
        let bounds = Bounds::from(metrics);

        match &mut self.running {
            Some(running) if running.progress.phase == phase => {
                running.bounds = bounds;
                clamp(&mut running.progress, bounds);
            },
            slot => {
                *slot = Some(Running {
                    bounds,
                    next_tick: now + self.config.tick,
                    progress: Progress::fresh(phase, bounds),
                });
            },
        }
        true
    }

    /// Stop and discard the timer. Returns whether it was running.
    pub fn stop(&mut self) -> bool {
        self.running.take().is_some()
    }

    /// Advance by every whole tick interval that has elapsed.
    ///
    /// Returns the new progress if at least one tick fired.
    pub fn tick(&mut self, now: Instant) -> Option<Progress> {
        let interval = self.config.tick;
        let running = self.running.as_mut()?;
        if now < running.next_tick || interval.is_zero() {
            return None;
        }

        let behind = now.duration_since(running.next_tick);
        let ticks = 1 + (behind.as_nanos() / interval.as_nanos()) as u32;
        for _ in 0..ticks {
            step(&mut running.progress, running.bounds, &self.config);
        }
        running.next_tick += interval * ticks;
        Some(running.progress)
    }
}

fn step(progress: &mut Progress, bounds: Bounds, config: &ClockConfig) {
    progress.elapsed += config.tick;
    if let Some(eta) = progress.eta_remaining_minutes.as_mut() {
        *eta = (*eta - config.eta_minutes_per_tick).max(0.0);
    }

    if progress.phase != RideStatus::Started {
        return;
    }
    let Some(total_km) = bounds.distance_km.filter(|km| *km > 0.0) else {
        return;
    };
    progress.distance_covered_km = (progress.distance_covered_km + config.km_per_tick).min(total_km);
    if let Some(total_fare) = bounds.fare {
        let rate = total_fare / total_km;
        progress.fare_accrued = (progress.fare_accrued + rate * config.km_per_tick).min(total_fare);
    }
}

fn clamp(progress: &mut Progress, bounds: Bounds) {
    if let Some(total_km) = bounds.distance_km {
        progress.distance_covered_km = progress.distance_covered_km.min(total_km.max(0.0));
    }
    if let Some(total_fare) = bounds.fare {
        progress.fare_accrued = progress.fare_accrued.min(total_fare.max(0.0));
    }
    progress.eta_remaining_minutes = match (progress.eta_remaining_minutes, bounds.eta_minutes) {
        (Some(current), Some(bound)) => Some(current.min(bound.max(0.0))),
        (current, bound) => current.or(bound.map(|eta| eta.max(0.0))),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(distance: f64, fare: f64, eta: f64) -> Metrics {
        Metrics::authoritative(Some(fare), Some(distance), Some(eta))
    }

    #[test]
    fn only_runs_while_accepted_or_started() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        assert!(!clock.start(RideStatus::Pending, &Metrics::default(), t0));
        assert!(clock.start(RideStatus::Accepted, &Metrics::default(), t0));
        assert!(!clock.start(RideStatus::Cancelled, &Metrics::default(), t0));
        assert!(!clock.is_running());
        assert!(clock.tick(t0 + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn accepted_counts_down_eta() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        clock.start(RideStatus::Accepted, &metrics(10.0, 155.0, 1.0), t0);

        assert!(clock.tick(t0).is_none());
        let progress = clock.tick(t0 + Duration::from_secs(30)).unwrap();
        assert_eq!(progress.elapsed, Duration::from_secs(30));
        assert!((progress.eta_remaining_minutes.unwrap() - 0.5).abs() < 1e-9);
        assert!(progress.distance_covered_km.abs() < f64::EPSILON);

        let progress = clock.tick(t0 + Duration::from_secs(120)).unwrap();
        assert!(progress.eta_remaining_minutes.unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn started_accrues_up_to_bounds() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        clock.start(RideStatus::Started, &metrics(0.02, 40.0, 1.0), t0);

        let progress = clock.tick(t0 + Duration::from_secs(1)).unwrap();
        assert!((progress.distance_covered_km - 0.008).abs() < 1e-9);
        assert!((progress.fare_accrued - 16.0).abs() < 1e-9);

        let progress = clock.tick(t0 + Duration::from_secs(100)).unwrap();
        assert!((progress.distance_covered_km - 0.02).abs() < 1e-9);
        assert!((progress.fare_accrued - 40.0).abs() < 1e-9);
    }

    #[test]
    fn restart_in_same_phase_keeps_progress() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        let m = metrics(5.0, 95.0, 9.0);
        clock.start(RideStatus::Started, &m, t0);
        clock.tick(t0 + Duration::from_secs(10));

        clock.start(RideStatus::Started, &m, t0 + Duration::from_secs(10));
        let progress = clock.tick(t0 + Duration::from_secs(11)).unwrap();
        assert_eq!(progress.elapsed, Duration::from_secs(11));
    }

    #[test]
    fn tighter_bounds_clamp_progress() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        clock.start(RideStatus::Started, &metrics(5.0, 95.0, 9.0), t0);
        clock.tick(t0 + Duration::from_secs(100));

        clock.start(RideStatus::Started, &metrics(0.1, 20.0, 1.0), t0 + Duration::from_secs(100));
        let progress = clock.progress().unwrap();
        assert!(progress.distance_covered_km <= 0.1);
        assert!(progress.fare_accrued <= 20.0);
        assert!(progress.eta_remaining_minutes.unwrap() <= 1.0);
    }

    #[test]
    fn phase_change_resets_elapsed() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        let m = metrics(5.0, 95.0, 9.0);
        clock.start(RideStatus::Accepted, &m, t0);
        clock.tick(t0 + Duration::from_secs(20));

        clock.start(RideStatus::Started, &m, t0 + Duration::from_secs(20));
        let progress = clock.progress().unwrap();
        assert_eq!(progress.phase, RideStatus::Started);
        assert_eq!(progress.elapsed, Duration::ZERO);
    }

    #[test]
    fn no_distance_bound_means_no_movement() {
        let t0 = Instant::now();
        let mut clock = SimulationClock::new(ClockConfig::default());
        clock.start(RideStatus::Started, &Metrics::default(), t0);
        let progress = clock.tick(t0 + Duration::from_secs(60)).unwrap();
        assert!(progress.distance_covered_km.abs() < f64::EPSILON);
        assert!(progress.eta_remaining_minutes.is_none());
    }
}
