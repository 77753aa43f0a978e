//! Matching-service socket messages.
//!
//! Every frame is a JSON object with a `type` tag. Inbound frames decode into
//! [`InboundMessage`]; an unrecognised tag becomes [`InboundMessage::Unknown`]
//! rather than an error so the session keeps running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::booking::BookingId;

pub const LOCATION_UPDATE: &str = "LOCATION_UPDATE";
pub const BOOKING_REQUEST: &str = "BOOKING_REQUEST";
pub const DRIVER_ASSIGNMENT: &str = "DRIVER_ASSIGNMENT";
pub const SYSTEM_MESSAGE: &str = "SYSTEM_MESSAGE";
pub const ERROR: &str = "ERROR";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("malformed {kind} payload: {reason}")]
    Payload { kind: String, reason: String },
}

/// Discriminant used to route inbound messages to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InboundKind {
    LocationUpdate,
    BookingNotification,
    AssignmentEvent,
    SystemMessage,
    Error,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    LocationUpdate { location: WireLocation },
    /// A booking offered to this driver; the payload shape is backend-defined.
    BookingNotification { booking: Value },
    AssignmentEvent { booking: Value },
    SystemMessage { message: String },
    Error { message: String },
    Unknown { kind: String, payload: Map<String, Value> },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Deserialize)]
struct LocationPayload {
    location: WireLocation,
}

#[derive(Deserialize)]
struct BookingPayload {
    booking: Value,
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    message: String,
}

impl InboundMessage {
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(frame).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
        let payload = Value::Object(envelope.payload);
        let kind = envelope.kind;

        let decode_err = |err: serde_json::Error| ProtocolError::Payload {
            kind: kind.clone(),
            reason: err.to_string(),
        };

        match kind.as_str() {
            LOCATION_UPDATE => {
                let body: LocationPayload = serde_json::from_value(payload).map_err(decode_err)?;
                Ok(InboundMessage::LocationUpdate {
                    location: body.location,
                })
            }
            BOOKING_REQUEST => {
                let body: BookingPayload = serde_json::from_value(payload).map_err(decode_err)?;
                Ok(InboundMessage::BookingNotification {
                    booking: body.booking,
                })
            }
            DRIVER_ASSIGNMENT => {
                let body: BookingPayload = serde_json::from_value(payload).map_err(decode_err)?;
                Ok(InboundMessage::AssignmentEvent {
                    booking: body.booking,
                })
            }
            SYSTEM_MESSAGE => {
                let body: TextPayload = serde_json::from_value(payload).map_err(decode_err)?;
                Ok(InboundMessage::SystemMessage {
                    message: body.message,
                })
            }
            ERROR => {
                let body: TextPayload = serde_json::from_value(payload).map_err(decode_err)?;
                Ok(InboundMessage::Error {
                    message: body.message,
                })
            }
            _ => {
                let Value::Object(payload) = payload else {
                    return Err(ProtocolError::Malformed("payload is not an object".to_string()));
                };
                Ok(InboundMessage::Unknown { kind, payload })
            }
        }
    }

    pub fn kind(&self) -> InboundKind {
        match self {
            InboundMessage::LocationUpdate { .. } => InboundKind::LocationUpdate,
            InboundMessage::BookingNotification { .. } => InboundKind::BookingNotification,
            InboundMessage::AssignmentEvent { .. } => InboundKind::AssignmentEvent,
            InboundMessage::SystemMessage { .. } => InboundKind::SystemMessage,
            InboundMessage::Error { .. } => InboundKind::Error,
            InboundMessage::Unknown { .. } => InboundKind::Unknown,
        }
    }

    /// Booking id carried by booking/assignment payloads, if any.
    pub fn booking_id(&self) -> Option<BookingId> {
        match self {
            InboundMessage::BookingNotification { booking }
            | InboundMessage::AssignmentEvent { booking } => booking
                .get("id")
                .cloned()
                .and_then(|id| serde_json::from_value(id).ok()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

/// Frames the client sends. Registration must be the first frame on every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "DRIVER_REGISTER", rename_all = "camelCase")]
    Registration {
        driver_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "DRIVER_LOCATION", rename_all = "camelCase")]
    LocationReport {
        driver_id: String,
        location: WireLocation,
    },
    #[serde(rename = "DRIVER_STATUS", rename_all = "camelCase")]
    StatusReport {
        driver_id: String,
        status: DriverStatus,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "BOOKING_RESPONSE", rename_all = "camelCase")]
    BookingResponse {
        driver_id: String,
        booking_id: BookingId,
        accepted: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "TRIP_COMPLETED", rename_all = "camelCase")]
    TripCompletion {
        driver_id: String,
        booking_id: BookingId,
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn registration(driver_id: impl Into<String>) -> Self {
        OutboundMessage::Registration {
            driver_id: driver_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_registration(&self) -> bool {
        matches!(self, OutboundMessage::Registration { .. })
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            OutboundMessage::Registration { .. } => "DRIVER_REGISTER",
            OutboundMessage::LocationReport { .. } => "DRIVER_LOCATION",
            OutboundMessage::StatusReport { .. } => "DRIVER_STATUS",
            OutboundMessage::BookingResponse { .. } => "BOOKING_RESPONSE",
            OutboundMessage::TripCompletion { .. } => "TRIP_COMPLETED",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_booking_request_with_numeric_id() {
        let frame = r#"{"type":"BOOKING_REQUEST","booking":{"id":17,"riderId":"r1"}}"#;
        let message = InboundMessage::parse(frame).expect("parse");
        assert_eq!(message.kind(), InboundKind::BookingNotification);
        assert_eq!(message.booking_id(), Some(BookingId::new("17")));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let frame = r#"{"type":"SURGE_PRICING","multiplier":1.5}"#;
        let message = InboundMessage::parse(frame).expect("parse");
        match message {
            InboundMessage::Unknown { kind, payload } => {
                assert_eq!(kind, "SURGE_PRICING");
                assert_eq!(payload.get("multiplier"), Some(&Value::from(1.5)));
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_protocol_errors() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"message":"no type"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"type":"LOCATION_UPDATE","location":"nowhere"}"#),
            Err(ProtocolError::Payload { .. })
        ));
    }

    #[test]
    fn system_message_without_text_defaults_empty() {
        let message = InboundMessage::parse(r#"{"type":"SYSTEM_MESSAGE"}"#).expect("parse");
        assert_eq!(
            message,
            InboundMessage::SystemMessage {
                message: String::new()
            }
        );
    }

    #[test]
    fn outbound_frames_use_wire_tags_and_camel_case() {
        let frame = OutboundMessage::BookingResponse {
            driver_id: "D1".to_string(),
            booking_id: BookingId::new("B1"),
            accepted: true,
            timestamp: Utc::now(),
        }
        .to_frame()
        .expect("frame");
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["type"], "BOOKING_RESPONSE");
        assert_eq!(value["driverId"], "D1");
        assert_eq!(value["bookingId"], "B1");
        assert_eq!(value["accepted"], true);
    }

    #[test]
    fn registration_tag_matches_helper() {
        let registration = OutboundMessage::registration("D1");
        assert!(registration.is_registration());
        let value: Value =
            serde_json::from_str(&registration.to_frame().expect("frame")).expect("json");
        assert_eq!(value["type"], registration.type_tag());
    }
}
