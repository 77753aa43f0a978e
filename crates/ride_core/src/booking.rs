//! Booking model and its forward-only status machine.
//!
//! Statuses advance REQUESTED -> ASSIGNED -> ACCEPTED -> IN_PROGRESS -> COMPLETED.
//! A decline sends an ASSIGNED booking back to REQUESTED for another offer.
//! COMPLETED, CANCELLED and DECLINED are terminal.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::geo::Coordinates;

/// Backend-assigned identifier. The backend may send it as a JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BookingId {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }
        Ok(match RawId::deserialize(de)? {
            RawId::Text(text) => BookingId(text),
            RawId::Number(number) => BookingId(number.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Requested,
    Assigned,
    Accepted,
    Declined,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Declined
        )
    }

    /// Progress rank along the happy path; terminal statuses rank highest.
    pub fn rank(self) -> u8 {
        match self {
            BookingStatus::Requested => 0,
            BookingStatus::Assigned => 1,
            BookingStatus::Accepted => 2,
            BookingStatus::InProgress => 3,
            BookingStatus::Completed
            | BookingStatus::Cancelled
            | BookingStatus::Declined => 4,
        }
    }

    /// Map a backend status string. Trip sub-statuses collapse to `InProgress`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" | "PENDING" => Some(BookingStatus::Requested),
            "ASSIGNED" => Some(BookingStatus::Assigned),
            "ACCEPTED" => Some(BookingStatus::Accepted),
            "DECLINED" => Some(BookingStatus::Declined),
            "IN_PROGRESS" | "PICKUP" | "RIDER_CONFIRMED" | "IN_TRANSIT" => {
                Some(BookingStatus::InProgress)
            }
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELLED" | "CANCELED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            BookingStatus::Requested => "REQUESTED",
            BookingStatus::Assigned => "ASSIGNED",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::Declined => "DECLINED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("booking is {0} and accepts no further transitions")]
    Terminal(BookingStatus),
    #[error("transition {from} -> {to} is not allowed")]
    NotAllowed {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("status ASSIGNED requires a driver id")]
    MissingDriver,
}

/// What a backend snapshot did to the local booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEffect {
    Advanced {
        from: BookingStatus,
        to: BookingStatus,
    },
    Unchanged,
    /// Earlier status, unknown status, or an offer from a declined driver.
    Stale,
}

/// Status snapshot returned by `GET /bookings/{id}` and driver-response calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSnapshot {
    pub id: BookingId,
    pub status: String,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub driver_assignment_status: Option<String>,
}

impl BookingSnapshot {
    pub fn parsed_status(&self) -> Option<BookingStatus> {
        BookingStatus::from_wire(&self.status)
    }

    pub fn driver(&self) -> Option<&str> {
        self.driver_id
            .as_deref()
            .map(str::trim)
            .filter(|driver| !driver.is_empty())
    }

    /// ASSIGNED with a non-empty driver id.
    pub fn is_assignment(&self) -> bool {
        self.parsed_status() == Some(BookingStatus::Assigned) && self.driver().is_some()
    }
}

/// Everything needed to submit a booking.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub rider_id: String,
    pub pickup: Coordinates,
    pub destination: Coordinates,
    pub tier_key: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub price: u64,
}

/// Client-side view of one booking. Mutated only by its owning coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub rider_id: String,
    pub pickup: Coordinates,
    pub destination: Coordinates,
    pub tier_key: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub price: u64,
    status: BookingStatus,
    driver_id: Option<String>,
    declined_drivers: Vec<String>,
}

impl Booking {
    pub fn requested(id: BookingId, request: BookingRequest) -> Self {
        Self {
            id,
            rider_id: request.rider_id,
            pickup: request.pickup,
            destination: request.destination,
            tier_key: request.tier_key,
            distance_km: request.distance_km,
            duration_min: request.duration_min,
            price: request.price,
            status: BookingStatus::Requested,
            driver_id: None,
            declined_drivers: Vec::new(),
        }
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn driver_id(&self) -> Option<&str> {
        self.driver_id.as_deref()
    }

    pub fn declined_drivers(&self) -> &[String] {
        &self.declined_drivers
    }

    pub fn reassignments(&self) -> u32 {
        self.declined_drivers.len() as u32
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a poll/response snapshot. Only forward transitions take effect.
    pub fn apply_snapshot(&mut self, snapshot: &BookingSnapshot) -> SnapshotEffect {
        let Some(next) = snapshot.parsed_status() else {
            return SnapshotEffect::Stale;
        };
        if self.status.is_terminal() {
            return SnapshotEffect::Stale;
        }
        if next == BookingStatus::Assigned {
            match snapshot.driver() {
                None => return SnapshotEffect::Stale,
                Some(driver) if self.has_declined(driver) => return SnapshotEffect::Stale,
                Some(_) => {}
            }
        }
        if next == self.status {
            if let (Some(driver), None) = (snapshot.driver(), self.driver_id.as_ref()) {
                self.driver_id = Some(driver.to_string());
            }
            return SnapshotEffect::Unchanged;
        }
        if next.rank() < self.status.rank() {
            return SnapshotEffect::Stale;
        }

        let from = self.status;
        self.status = next;
        if let Some(driver) = snapshot.driver() {
            self.driver_id = Some(driver.to_string());
        }
        SnapshotEffect::Advanced { from, to: next }
    }

    /// Local transition driven by the rider's own action.
    pub fn transition(&mut self, to: BookingStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        let allowed = match (self.status, to) {
            (_, BookingStatus::Cancelled) => true,
            (BookingStatus::Requested, BookingStatus::Assigned) => true,
            (BookingStatus::Assigned, BookingStatus::Accepted) => true,
            (BookingStatus::Assigned, BookingStatus::Declined) => true,
            (BookingStatus::Requested, BookingStatus::Declined) => true,
            (BookingStatus::Accepted, BookingStatus::InProgress) => true,
            (BookingStatus::Accepted | BookingStatus::InProgress, BookingStatus::Completed) => true,
            _ => false,
        };
        if !allowed {
            return Err(TransitionError::NotAllowed {
                from: self.status,
                to,
            });
        }
        if to == BookingStatus::Assigned && self.driver_id.is_none() {
            return Err(TransitionError::MissingDriver);
        }
        self.status = to;
        Ok(())
    }

    /// Record that the offered driver was declined and return to REQUESTED.
    pub fn decline_current_driver(&mut self) -> Result<String, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if self.status != BookingStatus::Assigned {
            return Err(TransitionError::NotAllowed {
                from: self.status,
                to: BookingStatus::Requested,
            });
        }
        let driver = self.driver_id.take().ok_or(TransitionError::MissingDriver)?;
        self.declined_drivers.push(driver.clone());
        self.status = BookingStatus::Requested;
        Ok(driver)
    }

    fn has_declined(&self, driver: &str) -> bool {
        self.declined_drivers.iter().any(|declined| declined == driver)
    }
}
