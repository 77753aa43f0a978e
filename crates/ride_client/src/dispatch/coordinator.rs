//! Booking lifecycle: submit, poll for a driver, accept or decline, complete.
//!
//! The coordinator owns the active [`Booking`] and is the only code that
//! mutates it. Callers get clones or references for display. Poll responses are
//! applied in arrival order and only forward transitions take effect.

use std::time::Duration;

use ride_core::booking::{Booking, BookingId, BookingRequest, BookingStatus, SnapshotEffect};
use ride_core::geo::Coordinates;
use ride_core::pricing::PricingEngine;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{BookingApi, DriverAction};
use super::error::DispatchError;
use crate::config::PollingPolicy;

/// Result of an assignment poll cycle. None of these are failures.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentOutcome {
    /// A driver is attached; the booking is ASSIGNED or already further along.
    Assigned(Booking),
    /// The attempt budget ran out without an offer.
    NoDriverAvailable { attempts: u32 },
    /// The backend reports a terminal status.
    Ended(BookingStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RespondOutcome {
    /// `in_progress` is set once the backend confirms the trip has started.
    Accepted { booking: Booking, in_progress: bool },
    /// The driver was declined and the booking was polled again.
    Declined(AssignmentOutcome),
    /// Too many declines; the booking is now DECLINED.
    ReassignmentLimitReached { declines: u32 },
}

pub struct DispatchCoordinator<A> {
    api: A,
    pricing: PricingEngine,
    policy: PollingPolicy,
    rider_id: String,
    booking: Option<Booking>,
    cancel: CancellationToken,
}

impl<A: BookingApi> DispatchCoordinator<A> {
    pub fn new(
        api: A,
        pricing: PricingEngine,
        policy: PollingPolicy,
        rider_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            pricing,
            policy,
            rider_id: rider_id.into(),
            booking: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight polling when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn booking(&self) -> Option<&Booking> {
        self.booking.as_ref()
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Forget the active booking.
    pub fn discard(&mut self) -> Option<Booking> {
        self.booking.take()
    }

    /// Price the trip for `tier_key` and create the booking.
    ///
    /// A failed submit is returned as-is and never retried; any earlier booking
    /// is kept until a new one is created.
    pub async fn submit(
        &mut self,
        pickup: Coordinates,
        destination: Coordinates,
        tier_key: &str,
        distance_km: f64,
        duration_min: f64,
    ) -> Result<BookingId, DispatchError> {
        let quote = self.pricing.quote(distance_km, duration_min, tier_key)?;
        let request = BookingRequest {
            rider_id: self.rider_id.clone(),
            pickup,
            destination,
            tier_key: quote.tier_key.clone(),
            distance_km,
            duration_min,
            price: quote.price,
        };

        let id = match self.api.submit(&request).await {
            Ok(id) => id,
            Err(error) => {
                warn!(%error, tier = tier_key, "Booking submit failed");
                return Err(error);
            }
        };
        info!(booking_id = %id, tier = %request.tier_key, price = request.price, "Booking submitted");
        self.booking = Some(Booking::requested(id.clone(), request));
        Ok(id)
    }

    /// Poll once per interval until a driver is assigned or `timeout` is spent.
    ///
    /// The first request goes out immediately. Each request is cut off at the
    /// next tick, so the whole cycle ends within `attempts × interval`.
    pub async fn poll_until_assigned(
        &mut self,
        id: &BookingId,
        timeout: Duration,
    ) -> Result<AssignmentOutcome, DispatchError> {
        let attempts = self.policy.attempts_within(timeout);
        let interval = self.policy.interval;
        let booking = active_booking(&mut self.booking, id)?;
        if booking.is_terminal() {
            return Ok(AssignmentOutcome::Ended(booking.status()));
        }

        let started = Instant::now();
        let deadline = started + interval.saturating_mul(attempts);
        let mut ticker = tokio::time::interval_at(started, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for attempt in 1..=attempts {
            let tick = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DispatchError::Cancelled),
                tick = ticker.tick() => tick,
            };
            let cutoff = (tick + interval).min(deadline);
            debug!(booking_id = %id, attempt, attempts, "Polling booking status");

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DispatchError::Cancelled),
                fetched = tokio::time::timeout_at(cutoff, self.api.fetch(id)) => fetched,
            };
            let snapshot = match fetched {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(error)) => {
                    warn!(booking_id = %id, attempt, %error, "Poll request failed");
                    continue;
                }
                Err(_) => {
                    warn!(booking_id = %id, attempt, "Poll request timed out");
                    continue;
                }
            };
            if snapshot.id != *id {
                debug!(booking_id = %id, got = %snapshot.id, "Ignoring snapshot for another booking");
                continue;
            }

            match booking.apply_snapshot(&snapshot) {
                SnapshotEffect::Advanced { from, to } => {
                    info!(booking_id = %id, %from, %to, "Booking status advanced");
                }
                SnapshotEffect::Stale => {
                    debug!(booking_id = %id, status = %snapshot.status, "Ignoring stale poll response");
                }
                SnapshotEffect::Unchanged => {}
            }

            if booking.is_terminal() {
                return Ok(AssignmentOutcome::Ended(booking.status()));
            }
            if booking.status().rank() >= BookingStatus::Assigned.rank()
                && booking.driver_id().is_some()
            {
                info!(
                    booking_id = %id,
                    driver_id = booking.driver_id().unwrap_or_default(),
                    attempt,
                    "Driver assigned"
                );
                return Ok(AssignmentOutcome::Assigned(booking.clone()));
            }
        }

        info!(booking_id = %id, attempts, "No driver available");
        Ok(AssignmentOutcome::NoDriverAvailable { attempts })
    }

    /// Accept or decline the driver currently offered for `id`.
    ///
    /// A decline re-enters polling on the same booking with the default budget,
    /// unless the reassignment cap is reached.
    pub async fn respond(
        &mut self,
        id: &BookingId,
        accept: bool,
    ) -> Result<RespondOutcome, DispatchError> {
        let booking = active_booking(&mut self.booking, id)?;
        let driver_id = booking
            .driver_id()
            .map(str::to_string)
            .ok_or_else(|| DispatchError::MissingDriver(id.clone()))?;

        if accept {
            let mut next = booking.clone();
            next.transition(BookingStatus::Accepted)?;
            let snapshot = self.api.respond(id, &driver_id, DriverAction::Accept).await?;
            if snapshot.id == *id {
                next.apply_snapshot(&snapshot);
            }
            let in_progress = next.status() == BookingStatus::InProgress;
            info!(booking_id = %id, %driver_id, in_progress, "Driver accepted");
            *booking = next.clone();
            return Ok(RespondOutcome::Accepted {
                booking: next,
                in_progress,
            });
        }

        let mut next = booking.clone();
        next.decline_current_driver()?;
        self.api.respond(id, &driver_id, DriverAction::Decline).await?;
        let declines = next.reassignments();
        info!(booking_id = %id, %driver_id, declines, "Driver declined");

        if declines >= self.policy.max_reassignments {
            next.transition(BookingStatus::Declined)?;
            *booking = next;
            warn!(booking_id = %id, declines, "Reassignment limit reached");
            return Ok(RespondOutcome::ReassignmentLimitReached { declines });
        }
        *booking = next;

        let outcome = self.poll_until_assigned(id, self.policy.budget()).await?;
        Ok(RespondOutcome::Declined(outcome))
    }

    /// Fetch one snapshot and apply it.
    pub async fn refresh(&mut self, id: &BookingId) -> Result<SnapshotEffect, DispatchError> {
        let booking = active_booking(&mut self.booking, id)?;
        let snapshot = self.api.fetch(id).await?;
        if snapshot.id != *id {
            return Err(DispatchError::BookingMismatch {
                expected: id.clone(),
                actual: snapshot.id,
            });
        }
        Ok(booking.apply_snapshot(&snapshot))
    }

    /// Report the trip as finished. No further transitions follow.
    pub async fn complete(&mut self, id: &BookingId) -> Result<(), DispatchError> {
        let booking = active_booking(&mut self.booking, id)?;
        let driver_id = booking
            .driver_id()
            .map(str::to_string)
            .ok_or_else(|| DispatchError::MissingDriver(id.clone()))?;
        let mut next = booking.clone();
        next.transition(BookingStatus::Completed)?;

        self.api.complete(id, &driver_id).await?;
        info!(booking_id = %id, %driver_id, "Trip completed");
        *booking = next;
        Ok(())
    }

    /// Cancel from any non-terminal status.
    pub async fn cancel(&mut self, id: &BookingId) -> Result<(), DispatchError> {
        let booking = active_booking(&mut self.booking, id)?;
        let mut next = booking.clone();
        next.transition(BookingStatus::Cancelled)?;

        self.api.cancel(id).await?;
        info!(booking_id = %id, from = %booking.status(), "Booking cancelled");
        *booking = next;
        Ok(())
    }
}

fn active_booking<'a>(
    slot: &'a mut Option<Booking>,
    id: &BookingId,
) -> Result<&'a mut Booking, DispatchError> {
    let Some(booking) = slot.as_mut() else {
        return Err(DispatchError::NoActiveBooking(id.clone()));
    };
    if booking.id != *id {
        return Err(DispatchError::BookingMismatch {
            expected: booking.id.clone(),
            actual: id.clone(),
        });
    }
    Ok(booking)
}
