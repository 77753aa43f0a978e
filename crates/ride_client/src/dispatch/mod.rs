//! Rider-side booking lifecycle against the booking backend.

mod api;
mod coordinator;
mod error;

pub use api::{BookingApi, DriverAction, HttpBookingApi};
pub use coordinator::{AssignmentOutcome, DispatchCoordinator, RespondOutcome};
pub use error::DispatchError;
