//! Tests for the gateway
//!
//! Covers:
//! - Each write endpoint publishing exactly one command on its topic
//! - Caller identity taken from the auth header
//! - Broker failures surfacing as 503

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use shared::commands::{CancelBooking, Command};
use shared::{InMemoryBroker, MessageBroker, Publisher, Topic};
use std::sync::Arc;
use tower::ServiceExt;

use crate::middleware::USER_ID_HEADER;
use crate::router::{create_router, Accepted, AppState};

fn app() -> (Arc<InMemoryBroker>, Router) {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = Publisher::new(broker.clone() as Arc<dyn MessageBroker>);
    (broker, create_router(AppState::new(publisher)))
}

fn request(method: Method, uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn booking_body() -> serde_json::Value {
    serde_json::json!({
        "provider_id": "p-1",
        "service_id": "svc-1",
        "scheduled_time": "2024-06-01T09:00:00Z",
        "location": { "latitude": 41.31, "longitude": 69.24 }
    })
}

#[tokio::test]
async fn test_health_check() {
    let (_, app) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_booking_publishes_command() {
    let (broker, app) = app();

    let response = app
        .oneshot(request(Method::POST, "/bookings", Some("u-1"), booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Accepted = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(body.status, "accepted");

    let published = broker.published(Topic::CreateBooking);
    assert_eq!(published.len(), 1);
    match Command::decode(Topic::CreateBooking, &published[0]).unwrap() {
        Command::CreateBooking(command) => {
            assert_eq!(command.user_id, "u-1");
            assert_eq!(command.service_id, "svc-1");
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let (broker, app) = app();

    let response = app
        .oneshot(request(Method::POST, "/bookings", None, booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(broker.published(Topic::CreateBooking).is_empty());
}

#[tokio::test]
async fn test_cancel_booking_publishes_id() {
    let (broker, app) = app();

    let response = app
        .oneshot(request(Method::DELETE, "/bookings/b-42", Some("u-1"), serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let published = broker.published(Topic::BookingCancelled);
    assert_eq!(
        Command::decode(Topic::BookingCancelled, &published[0]).unwrap(),
        Command::CancelBooking(CancelBooking { id: "b-42".to_string() })
    );
}

#[tokio::test]
async fn test_payment_review_notification_endpoints() {
    let (broker, app) = app();

    let cases = [
        (
            "/payments",
            serde_json::json!({ "booking_id": "b-1", "amount": 30.0, "payment_method": "card" }),
            Topic::PaymentProcessed,
        ),
        (
            "/reviews",
            serde_json::json!({ "booking_id": "b-1", "provider_id": "p-1", "rating": 5.0 }),
            Topic::ReviewSubmitted,
        ),
        (
            "/notifications",
            serde_json::json!({ "user_id": "u-2", "message": "on the way" }),
            Topic::CreateNotification,
        ),
    ];

    for (uri, body, topic) in cases {
        let response = app
            .clone()
            .oneshot(request(Method::POST, uri, Some("u-1"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED, "{}", uri);
        assert_eq!(broker.published(topic).len(), 1, "{}", uri);
    }
}

#[tokio::test]
async fn test_invalid_payment_rejected_at_edge() {
    let (broker, app) = app();

    let response = app
        .oneshot(request(
            Method::POST,
            "/payments",
            Some("u-1"),
            serde_json::json!({ "booking_id": "b-1", "amount": -5.0, "payment_method": "card" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(broker.published(Topic::PaymentProcessed).is_empty());
}

#[tokio::test]
async fn test_broker_outage_is_service_unavailable() {
    let (broker, app) = app();
    broker.disconnect();

    let response = app
        .oneshot(request(Method::POST, "/bookings", Some("u-1"), booking_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "command broker unavailable");
}

#[tokio::test]
async fn test_request_id_propagated() {
    let (_, app) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
