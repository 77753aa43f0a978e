//! Synthetic position source for the driver simulator and offline runs.
//!
//! The device drifts from a start point at a fixed speed, turning by a small
//! random amount on every fix. Reported accuracy is drawn from a range so the
//! acquisition engine sees realistic improvement and regression.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ride_core::geo::Coordinates;
use ride_core::position::PositionSample;

use super::source::{PositionError, PositionRequest, PositionSource};

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub speed_kmh: f64,
    /// Simulated time between consecutive fixes.
    pub step: Duration,
    pub accuracy_range_m: (f64, f64),
    /// Maximum heading change per fix, in degrees.
    pub max_turn_deg: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            speed_kmh: 25.0,
            step: Duration::from_secs(5),
            accuracy_range_m: (4.0, 60.0),
            max_turn_deg: 25.0,
        }
    }
}

#[derive(Debug)]
struct Walker {
    lat: f64,
    lng: f64,
    heading_deg: f64,
    rng: StdRng,
}

#[derive(Debug)]
pub struct SimulatedPositionSource {
    settings: SimulationSettings,
    walker: Mutex<Walker>,
}

impl SimulatedPositionSource {
    pub fn new(start: Coordinates, settings: SimulationSettings) -> Self {
        Self::with_rng(start, settings, StdRng::from_entropy())
    }

    /// Deterministic walk for reproducible runs.
    pub fn seeded(start: Coordinates, settings: SimulationSettings, seed: u64) -> Self {
        Self::with_rng(start, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(start: Coordinates, settings: SimulationSettings, mut rng: StdRng) -> Self {
        let heading_deg = rng.gen_range(0.0..360.0);
        Self {
            settings,
            walker: Mutex::new(Walker {
                lat: start.lat(),
                lng: start.lng(),
                heading_deg,
                rng,
            }),
        }
    }

    fn next_sample(&self) -> Result<PositionSample, PositionError> {
        let mut walker = self.walker.lock().unwrap_or_else(PoisonError::into_inner);
        let settings = &self.settings;

        let turn = settings.max_turn_deg.abs();
        if turn > 0.0 {
            let delta = walker.rng.gen_range(-turn..=turn);
            walker.heading_deg = (walker.heading_deg + delta).rem_euclid(360.0);
        }

        let meters = settings.speed_kmh.max(0.0) * 1_000.0 * settings.step.as_secs_f64() / 3_600.0;
        let heading = walker.heading_deg.to_radians();
        let d_lat = meters * heading.cos() / METERS_PER_DEGREE_LAT;
        let lng_scale = (METERS_PER_DEGREE_LAT * walker.lat.to_radians().cos()).max(1.0);
        let d_lng = meters * heading.sin() / lng_scale;
        walker.lat = (walker.lat + d_lat).clamp(-89.9, 89.9);
        walker.lng = (walker.lng + d_lng + 180.0).rem_euclid(360.0) - 180.0;

        let (low, high) = settings.accuracy_range_m;
        let accuracy = if high > low {
            walker.rng.gen_range(low..high)
        } else {
            low
        };

        let position = Coordinates::new(walker.lat, walker.lng)
            .map_err(|error| PositionError::PositionUnavailable(error.to_string()))?;
        Ok(PositionSample::captured(
            position.lat(),
            position.lng(),
            Some(accuracy),
            Utc::now(),
        ))
    }
}

impl PositionSource for SimulatedPositionSource {
    async fn request_position(
        &self,
        _request: PositionRequest,
    ) -> Result<PositionSample, PositionError> {
        self.next_sample()
    }
}
