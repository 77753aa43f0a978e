use ride_core::booking::{BookingId, TransitionError};
use ride_core::pricing::PricingError;
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("booking backend unreachable: {0}")]
    Http(String),
    #[error("booking backend returned {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("unexpected booking backend response: {0}")]
    Decode(String),
    #[error("no active booking {0}")]
    NoActiveBooking(BookingId),
    #[error("response for booking {actual} while tracking {expected}")]
    BookingMismatch {
        expected: BookingId,
        actual: BookingId,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("booking {0} has no assigned driver")]
    MissingDriver(BookingId),
    #[error("dispatch operation cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Http(_) => ErrorKind::Transient,
            DispatchError::Status { status, .. } if *status >= 500 => ErrorKind::Transient,
            DispatchError::Status { status: 401 | 403, .. } => ErrorKind::Permission,
            DispatchError::Status { .. } => ErrorKind::Fatal,
            DispatchError::Decode(_) | DispatchError::BookingMismatch { .. } => {
                ErrorKind::Protocol
            }
            DispatchError::Cancelled => ErrorKind::BusinessOutcome,
            DispatchError::NoActiveBooking(_)
            | DispatchError::Transition(_)
            | DispatchError::Pricing(_)
            | DispatchError::MissingDriver(_) => ErrorKind::Fatal,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DispatchError::Decode(err.to_string())
        } else {
            DispatchError::Http(err.to_string())
        }
    }
}
