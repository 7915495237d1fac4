//! Tests for the shared messaging layer
//!
//! Covers:
//! - Publisher topic validation and broker failure surfacing
//! - Typed publish helpers landing on their bound topic
//! - Environment configuration overlay

use std::sync::Arc;

use serde::Deserialize;

use crate::broker::{BrokerError, MessageBroker};
use crate::commands::{
    CancelBooking, Command, CreateBooking, CreateNotification, GeoPoint, ProcessPayment,
    SubmitReview,
};
use crate::config;
use crate::memory::InMemoryBroker;
use crate::publisher::{PublishError, Publisher};
use crate::topics::Topic;

fn publisher() -> (Arc<InMemoryBroker>, Publisher) {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = Publisher::new(broker.clone() as Arc<dyn MessageBroker>);
    (broker, publisher)
}

fn booking() -> CreateBooking {
    CreateBooking {
        user_id: "u-1".to_string(),
        provider_id: "p-1".to_string(),
        service_id: "svc-1".to_string(),
        scheduled_time: "2024-06-01T09:00:00Z".parse().unwrap(),
        location: GeoPoint { latitude: 41.31, longitude: 69.24 },
    }
}

// =============================================================================
// Publisher
// =============================================================================

#[tokio::test]
async fn test_publish_raw_payload_to_known_topic() {
    let (broker, publisher) = publisher();

    publisher
        .publish("payment_processed", br#"{"anything":"goes"}"#)
        .await
        .unwrap();

    let published = broker.published(Topic::PaymentProcessed);
    assert_eq!(published.len(), 1);
    assert_eq!(&published[0][..], br#"{"anything":"goes"}"#);
}

#[test]
fn test_publish_unknown_topic_is_rejected() {
    let (broker, publisher) = publisher();

    let err = tokio_test::block_on(publisher.publish("booking_created", b"{}")).unwrap_err();
    assert!(matches!(err, PublishError::UnknownTopic(_)));
    for topic in Topic::ALL {
        assert!(broker.published(topic).is_empty());
    }
}

#[tokio::test]
async fn test_publish_surfaces_broker_unavailable() {
    let (broker, publisher) = publisher();
    broker.disconnect();

    let err = publisher.create_booking(booking()).await.unwrap_err();
    assert!(matches!(err, PublishError::Broker(BrokerError::Unavailable)));

    broker.reconnect();
    publisher.create_booking(booking()).await.unwrap();
    assert_eq!(broker.published(Topic::CreateBooking).len(), 1);
}

#[tokio::test]
async fn test_typed_helpers_use_bound_topics() {
    let (broker, publisher) = publisher();

    publisher.create_booking(booking()).await.unwrap();
    publisher
        .cancel_booking(CancelBooking { id: "b-1".to_string() })
        .await
        .unwrap();
    publisher
        .payment(ProcessPayment {
            user_id: "u-1".to_string(),
            booking_id: "b-1".to_string(),
            amount: 25.5,
            payment_method: "card".to_string(),
            transaction_id: "tx-1".to_string(),
        })
        .await
        .unwrap();
    publisher
        .review(SubmitReview {
            booking_id: "b-1".to_string(),
            user_id: "u-1".to_string(),
            provider_id: "p-1".to_string(),
            rating: 4.5,
            comment: "on time".to_string(),
        })
        .await
        .unwrap();
    publisher
        .create_notification(CreateNotification {
            user_id: "u-1".to_string(),
            message: "see you soon".to_string(),
        })
        .await
        .unwrap();

    for topic in Topic::LIVE {
        assert_eq!(broker.published(topic).len(), 1, "topic {}", topic);
    }
    assert!(broker.published(Topic::BookingUpdated).is_empty());
}

#[tokio::test]
async fn test_published_body_decodes_on_its_topic() {
    let (broker, publisher) = publisher();
    publisher.create_booking(booking()).await.unwrap();

    let body = broker.published(Topic::CreateBooking).remove(0);
    let decoded = Command::decode(Topic::CreateBooking, &body).unwrap();
    assert_eq!(decoded, Command::CreateBooking(booking()));
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Deserialize)]
struct SampleSettings {
    nats_url: String,
    prefetch: usize,
}

#[test]
fn test_config_env_overrides_defaults() {
    std::env::set_var("SHAREDTEST_PREFETCH", "8");

    let defaults = config::defaults()
        .set_default("nats_url", "nats://localhost:4222")
        .unwrap()
        .set_default("prefetch", 1)
        .unwrap();
    let settings: SampleSettings = config::from_env("SHAREDTEST", defaults).unwrap();

    assert_eq!(settings.nats_url, "nats://localhost:4222");
    assert_eq!(settings.prefetch, 8);
    std::env::remove_var("SHAREDTEST_PREFETCH");
}

#[test]
fn test_config_reports_bad_values() {
    std::env::set_var("SHAREDBAD_PREFETCH", "lots");

    let defaults = config::defaults().set_default("nats_url", "nats://x").unwrap();
    let result: Result<SampleSettings, _> = config::from_env("SHAREDBAD", defaults);
    assert!(result.is_err());
    std::env::remove_var("SHAREDBAD_PREFETCH");
}
