//! Command envelopes and their JSON codec
//!
//! The body carries only the command's own fields; the topic it travels on
//! decides which variant it decodes into.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::topics::Topic;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed {topic} payload: {source}")]
    Decode {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {topic} command: {source}")]
    Encode {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBooking {
    pub user_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBooking {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBooking {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessPayment {
    pub user_id: String,
    pub booking_id: String,
    pub amount: f64,
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReview {
    pub booking_id: String,
    pub user_id: String,
    pub provider_id: String,
    pub rating: f32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub message: String,
}

/// A decoded command. Each variant is bound to exactly one topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateBooking(CreateBooking),
    CancelBooking(CancelBooking),
    ProcessPayment(ProcessPayment),
    SubmitReview(SubmitReview),
    CreateNotification(CreateNotification),
    UpdateBooking(UpdateBooking),
}

impl Command {
    pub fn topic(&self) -> Topic {
        match self {
            Command::CreateBooking(_) => Topic::CreateBooking,
            Command::CancelBooking(_) => Topic::BookingCancelled,
            Command::ProcessPayment(_) => Topic::PaymentProcessed,
            Command::SubmitReview(_) => Topic::ReviewSubmitted,
            Command::CreateNotification(_) => Topic::CreateNotification,
            Command::UpdateBooking(_) => Topic::BookingUpdated,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let topic = self.topic();
        let encoded = match self {
            Command::CreateBooking(c) => serde_json::to_vec(c),
            Command::CancelBooking(c) => serde_json::to_vec(c),
            Command::ProcessPayment(c) => serde_json::to_vec(c),
            Command::SubmitReview(c) => serde_json::to_vec(c),
            Command::CreateNotification(c) => serde_json::to_vec(c),
            Command::UpdateBooking(c) => serde_json::to_vec(c),
        };
        encoded.map_err(|source| CodecError::Encode { topic, source })
    }

    /// Decode `payload` as the variant bound to `topic`.
    pub fn decode(topic: Topic, payload: &[u8]) -> Result<Command, CodecError> {
        Ok(match topic {
            Topic::CreateBooking => Command::CreateBooking(decode_body(topic, payload)?),
            Topic::BookingCancelled => Command::CancelBooking(decode_body(topic, payload)?),
            Topic::PaymentProcessed => Command::ProcessPayment(decode_body(topic, payload)?),
            Topic::ReviewSubmitted => Command::SubmitReview(decode_body(topic, payload)?),
            Topic::CreateNotification => {
                Command::CreateNotification(decode_body(topic, payload)?)
            }
            Topic::BookingUpdated => Command::UpdateBooking(decode_body(topic, payload)?),
        })
    }
}

fn decode_body<T: DeserializeOwned>(topic: Topic, payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(|source| CodecError::Decode { topic, source })
}

macro_rules! impl_from_command {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Command {
                fn from(value: $variant) -> Self {
                    Command::$variant(value)
                }
            }
        )*
    };
}

impl_from_command!(
    CreateBooking,
    CancelBooking,
    ProcessPayment,
    SubmitReview,
    CreateNotification,
    UpdateBooking,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_has_no_envelope_header() {
        let cmd = Command::CancelBooking(CancelBooking { id: "b-1".into() });
        let body: serde_json::Value = serde_json::from_slice(&cmd.encode().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "id": "b-1" }));
    }

    #[test]
    fn test_scheduled_time_is_rfc3339() {
        let cmd = Command::CreateBooking(CreateBooking {
            user_id: "u-1".into(),
            provider_id: "p-1".into(),
            service_id: "svc-1".into(),
            scheduled_time: "2024-05-01T10:30:00Z".parse().unwrap(),
            location: GeoPoint { latitude: 41.3, longitude: 69.2 },
        });
        let body: serde_json::Value = serde_json::from_slice(&cmd.encode().unwrap()).unwrap();
        assert_eq!(body["scheduled_time"], "2024-05-01T10:30:00Z");
        assert_eq!(body["location"]["latitude"], 41.3);
    }

    #[test]
    fn test_body_on_wrong_topic_is_rejected() {
        let body = br#"{"id":"b-1"}"#;
        assert!(Command::decode(Topic::BookingCancelled, body).is_ok());
        let err = Command::decode(Topic::CreateBooking, body).unwrap_err();
        assert!(matches!(err, CodecError::Decode { topic: Topic::CreateBooking, .. }));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = Command::decode(Topic::PaymentProcessed, b"{not json").unwrap_err();
        assert!(err.to_string().contains("payment_processed"));
    }

    #[test]
    fn test_update_booking_optional_fields() {
        let cmd = Command::decode(Topic::BookingUpdated, br#"{"id":"b-9","status":"confirmed"}"#)
            .unwrap();
        match cmd {
            Command::UpdateBooking(update) => {
                assert_eq!(update.status, Some(BookingStatus::Confirmed));
                assert!(update.scheduled_time.is_none());
                assert!(update.location.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
