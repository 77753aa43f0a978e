//! Driver-side session on top of the transport: location streaming and the
//! status, booking-response and trip-completion reports.

use std::time::Duration;

use chrono::Utc;
use ride_core::booking::BookingId;
use ride_core::message::{DriverStatus, InboundKind, InboundMessage, OutboundMessage, WireLocation};
use ride_core::position::PositionSample;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::location::{PositionRequest, PositionSource};
use crate::transport::{ConnectionState, SocketConnector, TransportClient, TransportError};

/// Summary of a finished [`DriverSession::stream_locations`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub sent: u64,
    /// Ticks skipped because no fix was available or the link was down.
    pub skipped: u64,
}

pub struct DriverSession<C: SocketConnector> {
    driver_id: String,
    transport: TransportClient<C>,
}

impl<C: SocketConnector> DriverSession<C> {
    pub fn new(driver_id: impl Into<String>, connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            driver_id: driver_id.into(),
            transport: TransportClient::new(connector, policy),
        }
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn on_message<F>(&self, kind: InboundKind, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.transport.on_message(kind, handler);
    }

    /// Open the transport and register as this driver.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.transport.open(self.driver_id.clone()).await?;
        info!(driver_id = %self.driver_id, "Driver session connected");
        Ok(())
    }

    pub async fn report_location(&self, sample: &PositionSample) -> Result<(), TransportError> {
        self.transport
            .send(OutboundMessage::LocationReport {
                driver_id: self.driver_id.clone(),
                location: WireLocation {
                    latitude: sample.latitude,
                    longitude: sample.longitude,
                    timestamp: Some(sample.captured_at),
                },
            })
            .await
    }

    pub async fn report_status(&self, status: DriverStatus) -> Result<(), TransportError> {
        self.transport
            .send(OutboundMessage::StatusReport {
                driver_id: self.driver_id.clone(),
                status,
                timestamp: Utc::now(),
            })
            .await
    }

    pub async fn respond_to_booking(
        &self,
        booking_id: &BookingId,
        accepted: bool,
    ) -> Result<(), TransportError> {
        self.transport
            .send(OutboundMessage::BookingResponse {
                driver_id: self.driver_id.clone(),
                booking_id: booking_id.clone(),
                accepted,
                timestamp: Utc::now(),
            })
            .await
    }

    pub async fn complete_trip(&self, booking_id: &BookingId) -> Result<(), TransportError> {
        self.transport
            .send(OutboundMessage::TripCompletion {
                driver_id: self.driver_id.clone(),
                booking_id: booking_id.clone(),
                timestamp: Utc::now(),
            })
            .await
    }

    /// Sample `source` once per `interval` and report each fix until `cancel` fires.
    ///
    /// Position failures and a temporarily down link skip the tick. The stream
    /// ends with an error once the transport is closed for good.
    pub async fn stream_locations<S: PositionSource>(
        &self,
        source: &S,
        interval: Duration,
        request: PositionRequest,
        cancel: CancellationToken,
    ) -> Result<StreamReport, TransportError> {
        let mut report = StreamReport::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(sent = report.sent, skipped = report.skipped, "Location stream stopped");
                    return Ok(report);
                }
                _ = ticker.tick() => {}
            }

            if self.transport.state() == ConnectionState::ClosedFinal {
                return Err(TransportError::Closed {
                    code: crate::transport::ABNORMAL_CLOSURE,
                    reason: "transport closed while streaming".to_string(),
                });
            }

            let sample = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(report),
                sample = source.request_position(request) => sample,
            };
            let sample = match sample {
                Ok(sample) => sample,
                Err(error) => {
                    debug!(%error, "No fix for location report");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.report_location(&sample).await {
                Ok(()) => report.sent += 1,
                Err(TransportError::NotConnected) => {
                    debug!("Link down, skipping location report");
                    report.skipped += 1;
                }
                Err(error) => {
                    warn!(%error, "Location report failed");
                    report.skipped += 1;
                }
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close("driver signed off").await
    }

    /// Wait until the transport ends on its own.
    pub async fn closed(&mut self) -> Result<(), TransportError> {
        self.transport.closed().await
    }
}
