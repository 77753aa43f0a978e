//! Device position samples, accuracy bands, and the last-known-location record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// One fix reported by the device. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of the 68% confidence circle in metres; `None` when the device did not say.
    pub accuracy_m: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: Option<f64>) -> Self {
        Self::captured(latitude, longitude, accuracy_m, Utc::now())
    }

    pub fn captured(
        latitude: f64,
        longitude: f64,
        accuracy_m: Option<f64>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            captured_at,
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::new(self.latitude, self.longitude).ok()
    }

    /// Accuracy used for ranking; unknown accuracy ranks below any known value.
    pub fn ranking_accuracy(&self) -> f64 {
        match self.accuracy_m {
            Some(value) if value.is_finite() => value,
            _ => f64::INFINITY,
        }
    }

    /// True when `self` is strictly more accurate than `other`.
    pub fn is_better_than(&self, other: &PositionSample) -> bool {
        self.ranking_accuracy() < other.ranking_accuracy()
    }

    pub fn meets(&self, threshold_m: f64) -> bool {
        self.ranking_accuracy() <= threshold_m
    }

    pub fn band(&self) -> AccuracyBand {
        AccuracyBand::classify(self.accuracy_m)
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.captured_at)
    }
}

/// Advisory accuracy classification for UI feedback. Never used for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccuracyBand {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
    Unknown,
}

impl AccuracyBand {
    pub fn classify(accuracy_m: Option<f64>) -> Self {
        match accuracy_m {
            Some(m) if m.is_nan() || m <= 0.0 => AccuracyBand::Unknown,
            Some(m) if m <= 5.0 => AccuracyBand::Excellent,
            Some(m) if m <= 10.0 => AccuracyBand::Good,
            Some(m) if m <= 20.0 => AccuracyBand::Fair,
            Some(m) if m <= 50.0 => AccuracyBand::Poor,
            Some(_) => AccuracyBand::VeryPoor,
            None => AccuracyBand::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AccuracyBand::Excellent => "Excellent",
            AccuracyBand::Good => "Good",
            AccuracyBand::Fair => "Fair",
            AccuracyBand::Poor => "Poor",
            AccuracyBand::VeryPoor => "Very Poor",
            AccuracyBand::Unknown => "Unknown",
        }
    }
}

/// Who the cached fix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionPurpose {
    Rider,
    Driver,
}

impl PositionPurpose {
    pub fn key(self) -> &'static str {
        match self {
            PositionPurpose::Rider => "rider",
            PositionPurpose::Driver => "driver",
        }
    }
}

/// Last known sample for a purpose; read only as a fallback when live acquisition fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedLocation {
    pub purpose: PositionPurpose,
    pub sample: PositionSample,
}

impl CachedLocation {
    pub fn new(purpose: PositionPurpose, sample: PositionSample) -> Self {
        Self { purpose, sample }
    }

    /// Fresh when the sample is no older than `window` at `now`. Future-dated samples count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.sample.age_at(now) <= window
    }
}
