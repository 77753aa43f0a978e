//! Booking backend seam and its HTTP implementation.

use std::future::Future;
use std::time::Duration;

use ride_core::booking::{BookingId, BookingRequest, BookingSnapshot, BookingStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverAction {
    Accept,
    Decline,
}

/// Client-observable booking backend protocol.
pub trait BookingApi: Send + Sync {
    /// Create a booking and return its backend id.
    fn submit(
        &self,
        request: &BookingRequest,
    ) -> impl Future<Output = Result<BookingId, DispatchError>> + Send;

    fn fetch(
        &self,
        id: &BookingId,
    ) -> impl Future<Output = Result<BookingSnapshot, DispatchError>> + Send;

    fn respond(
        &self,
        id: &BookingId,
        driver_id: &str,
        action: DriverAction,
    ) -> impl Future<Output = Result<BookingSnapshot, DispatchError>> + Send;

    fn complete(
        &self,
        id: &BookingId,
        driver_id: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;

    fn cancel(&self, id: &BookingId) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    rider_id: &'a str,
    pickup_location: String,
    destination_location: String,
    vehicle_type: &'a str,
    distance: f64,
    duration: f64,
    price: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: BookingId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DriverResponseBody<'a> {
    action: DriverAction,
    driver_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    driver_id: Option<&'a str>,
}

/// JSON-over-HTTP booking backend rooted at `base_url` (e.g. `http://host/api`).
#[derive(Debug, Clone)]
pub struct HttpBookingApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBookingApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DispatchError::Http(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, DispatchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let reason = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body
        };
        Err(DispatchError::Status {
            status: status.as_u16(),
            reason,
        })
    }
}

impl BookingApi for HttpBookingApi {
    async fn submit(&self, request: &BookingRequest) -> Result<BookingId, DispatchError> {
        let body = SubmitBody {
            rider_id: &request.rider_id,
            pickup_location: request.pickup.to_wire(),
            destination_location: request.destination.to_wire(),
            vehicle_type: &request.tier_key,
            distance: request.distance_km,
            duration: request.duration_min,
            price: request.price,
        };
        let response = self
            .client
            .post(self.url("/bookings"))
            .json(&body)
            .send()
            .await?;
        let created: SubmitResponse = Self::checked(response).await?.json().await?;
        debug!(booking_id = %created.id, "Booking created");
        Ok(created.id)
    }

    async fn fetch(&self, id: &BookingId) -> Result<BookingSnapshot, DispatchError> {
        let response = self
            .client
            .get(self.url(&format!("/bookings/{id}")))
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn respond(
        &self,
        id: &BookingId,
        driver_id: &str,
        action: DriverAction,
    ) -> Result<BookingSnapshot, DispatchError> {
        let response = self
            .client
            .post(self.url(&format!("/bookings/{id}/driver-response")))
            .json(&DriverResponseBody { action, driver_id })
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn complete(&self, id: &BookingId, driver_id: &str) -> Result<(), DispatchError> {
        let body = StatusBody {
            status: BookingStatus::Completed.as_wire(),
            driver_id: Some(driver_id),
        };
        let response = self
            .client
            .post(self.url(&format!("/bookings/{id}/update-ride-status")))
            .json(&body)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn cancel(&self, id: &BookingId) -> Result<(), DispatchError> {
        let body = StatusBody {
            status: BookingStatus::Cancelled.as_wire(),
            driver_id: None,
        };
        let response = self
            .client
            .put(self.url(&format!("/bookings/{id}/status")))
            .json(&body)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }
}
