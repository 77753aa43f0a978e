//! Accuracy-aware position acquisition.
//!
//! Each attempt asks the [`PositionSource`] for a high-accuracy fix. The most
//! accurate sample seen so far is kept; the first sample within the threshold
//! ends the run early. When the budget runs out the best sample wins, and when
//! no sample arrived at all a fresh cached location is used instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ride_core::geo::is_plausible_fix;
use ride_core::position::{CachedLocation, PositionPurpose, PositionSample};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::LocationError;
use super::source::{PositionError, PositionRequest, PositionSource};
use super::store::LocationStore;
use crate::config::LocationPolicy;

/// Where an acquired sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    Live,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    pub sample: PositionSample,
    pub origin: SampleOrigin,
    /// Source requests issued, including failed ones.
    pub attempts: u32,
    pub met_threshold: bool,
}

pub struct LocationAcquisitionEngine<S> {
    source: S,
    store: Arc<dyn LocationStore>,
    policy: LocationPolicy,
    cancel: CancellationToken,
}

impl<S: PositionSource> LocationAcquisitionEngine<S> {
    pub fn new(source: S, store: Arc<dyn LocationStore>, policy: LocationPolicy) -> Self {
        Self {
            source,
            store,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop in-flight and future acquisitions when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &LocationPolicy {
        &self.policy
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Acquire using the configured attempt budget and accuracy threshold.
    pub async fn acquire_default(
        &self,
        purpose: PositionPurpose,
    ) -> Result<Acquisition, LocationError> {
        self.acquire(
            purpose,
            self.policy.max_attempts,
            self.policy.accuracy_threshold_m,
        )
        .await
    }

    /// Run up to `max_attempts` requests and return the first sample within
    /// `accuracy_threshold_m`, else the most accurate one seen.
    ///
    /// A successful sample is written to the store only when it is more
    /// accurate than every earlier sample of this run. A worse later fix never
    /// replaces a better cached one, so the store ends up holding the sample
    /// this call returns.
    pub async fn acquire(
        &self,
        purpose: PositionPurpose,
        max_attempts: u32,
        accuracy_threshold_m: f64,
    ) -> Result<Acquisition, LocationError> {
        let request =
            PositionRequest::high_accuracy(self.policy.attempt_timeout, self.policy.max_sample_age);
        let mut best: Option<PositionSample> = None;
        let mut last_failure: Option<LocationError> = None;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.pause(self.policy.inter_attempt_delay).await?;
            }
            attempts = attempt;

            match self.request_once(request).await? {
                Ok(sample) if !is_plausible_fix(sample.latitude, sample.longitude) => {
                    warn!(
                        attempt,
                        lat = sample.latitude,
                        lng = sample.longitude,
                        "Discarding implausible position fix"
                    );
                    last_failure = Some(LocationError::PositionUnavailable(
                        "implausible coordinates".to_string(),
                    ));
                }
                Ok(sample) => {
                    info!(
                        attempt,
                        max_attempts,
                        accuracy_m = ?sample.accuracy_m,
                        band = sample.band().label(),
                        "Position sample received"
                    );
                    let improves = match best {
                        Some(current) => sample.is_better_than(&current),
                        None => true,
                    };
                    if improves {
                        best = Some(sample);
                        self.remember(purpose, sample);
                    }
                    if sample.meets(accuracy_threshold_m) {
                        let sample = best.unwrap_or(sample);
                        return Ok(Acquisition {
                            sample,
                            origin: SampleOrigin::Live,
                            attempts,
                            met_threshold: true,
                        });
                    }
                }
                Err(PositionError::PermissionDenied(reason)) => {
                    warn!(attempt, %reason, "Location permission denied");
                    return Err(LocationError::PermissionDenied(reason));
                }
                Err(error) => {
                    warn!(attempt, max_attempts, %error, "Position attempt failed");
                    last_failure = Some(error.into());
                }
            }
        }

        if let Some(sample) = best {
            info!(
                attempts,
                accuracy_m = ?sample.accuracy_m,
                threshold_m = accuracy_threshold_m,
                "Accuracy target not met, using best sample"
            );
            return Ok(Acquisition {
                sample,
                origin: SampleOrigin::Live,
                attempts,
                met_threshold: false,
            });
        }

        self.cached_fallback(purpose, attempts, last_failure)
    }

    /// One source request bounded by the per-attempt timeout. `Err` only on cancellation.
    async fn request_once(
        &self,
        request: PositionRequest,
    ) -> Result<Result<PositionSample, PositionError>, LocationError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LocationError::Cancelled),
            result = tokio::time::timeout(request.timeout, self.source.request_position(request)) => {
                Ok(result.unwrap_or(Err(PositionError::Timeout(request.timeout))))
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), LocationError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LocationError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn remember(&self, purpose: PositionPurpose, sample: PositionSample) {
        match self.store.save(&CachedLocation::new(purpose, sample)) {
            Ok(()) => debug!(purpose = purpose.key(), "Cached location updated"),
            Err(error) => warn!(purpose = purpose.key(), %error, "Failed to cache location"),
        }
    }

    fn cached_fallback(
        &self,
        purpose: PositionPurpose,
        attempts: u32,
        last_failure: Option<LocationError>,
    ) -> Result<Acquisition, LocationError> {
        let reason = last_failure
            .map(|error| error.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());

        let cached = match self.store.load(purpose) {
            Ok(cached) => cached,
            Err(error) => {
                warn!(purpose = purpose.key(), %error, "Failed to read cached location");
                None
            }
        };
        let freshness = chrono::Duration::from_std(self.policy.cache_freshness)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));

        match cached {
            Some(cached) if cached.is_fresh(Utc::now(), freshness) => {
                info!(
                    purpose = purpose.key(),
                    age_s = cached.sample.age_at(Utc::now()).num_seconds(),
                    "Live acquisition failed, using cached location"
                );
                Ok(Acquisition {
                    sample: cached.sample,
                    origin: SampleOrigin::Cache,
                    attempts,
                    met_threshold: false,
                })
            }
            Some(_) => {
                warn!(purpose = purpose.key(), "Cached location is stale");
                Err(LocationError::LocationUnavailable(format!(
                    "{reason}; cached location is stale"
                )))
            }
            None => Err(LocationError::LocationUnavailable(format!(
                "{reason}; no cached location"
            ))),
        }
    }
}
