use thiserror::Error;

use super::source::PositionError;
use super::store::StoreError;
use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location permission denied: {0}")]
    PermissionDenied(String),
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("position request timed out: {0}")]
    Timeout(String),
    /// No live sample and no fresh cached location.
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),
    #[error("location acquisition cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LocationError::PermissionDenied(_) => ErrorKind::Permission,
            LocationError::PositionUnavailable(_) | LocationError::Timeout(_) => {
                ErrorKind::Transient
            }
            LocationError::Cancelled => ErrorKind::BusinessOutcome,
            // Returned only after the attempt budget and the cache are both spent.
            LocationError::LocationUnavailable(_) | LocationError::Store(_) => ErrorKind::Fatal,
        }
    }
}

impl From<PositionError> for LocationError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::PermissionDenied(reason) => LocationError::PermissionDenied(reason),
            PositionError::PositionUnavailable(reason) => {
                LocationError::PositionUnavailable(reason)
            }
            PositionError::Timeout(after) => {
                LocationError::Timeout(format!("no fix within {after:?}"))
            }
        }
    }
}
