//! Device geolocation seam.

use std::future::Future;
use std::time::Duration;

use ride_core::position::PositionSample;
use thiserror::Error;

/// Options passed with every position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRequest {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached device fix acceptable; zero asks for a fresh one.
    pub max_age: Duration,
}

impl PositionRequest {
    pub fn high_accuracy(timeout: Duration, max_age: Duration) -> Self {
        Self {
            high_accuracy: true,
            timeout,
            max_age,
        }
    }
}

/// Error codes a geolocation provider reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied: {0}")]
    PermissionDenied(String),
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("position request timed out after {0:?}")]
    Timeout(Duration),
}

/// Produces raw position samples from the device.
pub trait PositionSource: Send + Sync {
    fn request_position(
        &self,
        request: PositionRequest,
    ) -> impl Future<Output = Result<PositionSample, PositionError>> + Send;
}

impl<S: PositionSource> PositionSource for std::sync::Arc<S> {
    fn request_position(
        &self,
        request: PositionRequest,
    ) -> impl Future<Output = Result<PositionSample, PositionError>> + Send {
        (**self).request_position(request)
    }
}
