//! Test helpers for common test setup and utilities.
//!
//! Shared fixtures so every test reuses the same geography and booking shape.

use chrono::{DateTime, Duration, Utc};

use crate::booking::{BookingId, BookingRequest, BookingSnapshot};
use crate::geo::Coordinates;
use crate::position::PositionSample;

/// Pickup point used across tests (Hyderabad city centre).
pub const TEST_PICKUP: (f64, f64) = (17.3850, 78.4867);

/// Destination roughly 13 km west of [`TEST_PICKUP`].
pub const TEST_DESTINATION: (f64, f64) = (17.4450, 78.3772);

/// Get the test pickup as `Coordinates`.
///
/// # Panics
///
/// Panics if the constant is invalid (should never happen).
pub fn test_pickup() -> Coordinates {
    Coordinates::new(TEST_PICKUP.0, TEST_PICKUP.1).expect("TEST_PICKUP should be valid")
}

/// Get the test destination as `Coordinates`.
///
/// # Panics
///
/// Panics if the constant is invalid (should never happen).
pub fn test_destination() -> Coordinates {
    Coordinates::new(TEST_DESTINATION.0, TEST_DESTINATION.1)
        .expect("TEST_DESTINATION should be valid")
}

/// A sample at the test pickup with the given accuracy, captured now.
pub fn sample_with_accuracy(accuracy_m: f64) -> PositionSample {
    PositionSample::new(TEST_PICKUP.0, TEST_PICKUP.1, Some(accuracy_m))
}

/// A sample at the test pickup captured `age` before `now`.
pub fn sample_aged(accuracy_m: f64, now: DateTime<Utc>, age: Duration) -> PositionSample {
    PositionSample::captured(TEST_PICKUP.0, TEST_PICKUP.1, Some(accuracy_m), now - age)
}

/// A 10 km bike booking between the test points.
pub fn test_booking_request() -> BookingRequest {
    BookingRequest {
        rider_id: "rider-1".to_string(),
        pickup: test_pickup(),
        destination: test_destination(),
        tier_key: "bike".to_string(),
        distance_km: 10.0,
        duration_min: 25.0,
        price: 60,
    }
}

/// A backend snapshot for booking `id`.
pub fn snapshot(id: &str, status: &str, driver_id: Option<&str>) -> BookingSnapshot {
    BookingSnapshot {
        id: BookingId::new(id),
        status: status.to_string(),
        driver_id: driver_id.map(str::to_string),
        price: None,
        distance: None,
        driver_assignment_status: None,
    }
}
