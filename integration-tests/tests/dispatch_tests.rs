//! End-to-end tests: HTTP edge → broker → dispatcher → domain services
//!
//! Everything runs in-process over the in-memory broker and ranking store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use booking_service::{
    DispatchPolicy, Dispatcher, DrainReport, InMemoryRankingStore, RankingEntry, RoutingTable,
    Services, ShutdownCoordinator, SubscriptionState,
};
use gateway_service::{create_router, AppState};
use shared::commands::{BookingStatus, Command, UpdateBooking};
use shared::memory::Outcome;
use shared::{InMemoryBroker, MessageBroker, Publisher, Topic};
use tower::ServiceExt;

struct Platform {
    broker: Arc<InMemoryBroker>,
    gateway: Router,
    publisher: Publisher,
    services: Services,
    dispatcher: Dispatcher,
    coordinator: ShutdownCoordinator,
}

impl Platform {
    async fn start(route_updates: bool) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let publisher = Publisher::new(broker.clone() as Arc<dyn MessageBroker>);
        let gateway = create_router(AppState::new(publisher.clone()));

        let services = Services::new(Arc::new(InMemoryRankingStore::new()));
        let routes = RoutingTable::for_services(&services, route_updates);
        let dispatcher = Dispatcher::new(broker.clone(), routes, DispatchPolicy::default());
        let coordinator = ShutdownCoordinator::new(Some(Duration::from_secs(5)));
        dispatcher.start(&coordinator).await.unwrap();

        Self {
            broker,
            gateway,
            publisher,
            services,
            dispatcher,
            coordinator,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: serde_json::Value) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-id", "u-1")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.gateway.clone().oneshot(request).await.unwrap().status()
    }

    async fn book(&self, service_id: &str) -> StatusCode {
        self.call(
            Method::POST,
            "/bookings",
            serde_json::json!({
                "provider_id": "p-1",
                "service_id": service_id,
                "scheduled_time": "2024-06-01T09:00:00Z",
                "location": { "latitude": 41.31, "longitude": 69.24 }
            }),
        )
        .await
    }

    async fn wait_for_settlements(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.broker.settlements().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {} settlements", count);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[tokio::test]
async fn test_bookings_feed_popular_services() {
    let platform = Platform::start(false).await;

    for service in ["svc-1", "svc-2", "svc-1"] {
        assert_eq!(platform.book(service).await, StatusCode::ACCEPTED);
    }
    platform.wait_for_settlements(3).await;

    let bookings = &platform.services.bookings;
    assert_eq!(
        bookings.popular_services(10).await.unwrap(),
        vec![RankingEntry::new("svc-1", 2), RankingEntry::new("svc-2", 1)]
    );
    assert_eq!(
        bookings.popular_services(1).await.unwrap(),
        vec![RankingEntry::new("svc-1", 2)]
    );
    assert!(bookings.popular_services(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_booking_cancel_round_trip() {
    let platform = Platform::start(false).await;

    platform.book("svc-1").await;
    platform.wait_for_settlements(1).await;
    let booking = platform.services.bookings.list_bookings("u-1").remove(0);
    assert_eq!(booking.status, BookingStatus::Pending);

    let status = platform
        .call(Method::DELETE, &format!("/bookings/{}", booking.id), serde_json::json!({}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    platform.wait_for_settlements(2).await;

    let cancelled = platform.services.bookings.get_booking(&booking.id).unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_failed_command_does_not_block_other_topics() {
    let platform = Platform::start(false).await;

    platform
        .call(Method::DELETE, "/bookings/does-not-exist", serde_json::json!({}))
        .await;
    platform
        .call(
            Method::POST,
            "/notifications",
            serde_json::json!({ "user_id": "u-9", "message": "hello" }),
        )
        .await;
    platform.wait_for_settlements(2).await;

    let cancel = platform.broker.settlements_for(Topic::BookingCancelled);
    assert_eq!(cancel[0].outcome, Outcome::Rejected { requeue: false });
    let notify = platform.broker.settlements_for(Topic::CreateNotification);
    assert_eq!(notify[0].outcome, Outcome::Acked);
    assert_eq!(platform.services.notifications.notifications_for("u-9").len(), 1);
}

#[tokio::test]
async fn test_booking_updated_consumed_only_when_routed() {
    let platform = Platform::start(true).await;

    platform.book("svc-1").await;
    platform.wait_for_settlements(1).await;
    let booking = platform.services.bookings.list_bookings("u-1").remove(0);

    platform
        .publisher
        .publish_command(&Command::UpdateBooking(UpdateBooking {
            id: booking.id.clone(),
            scheduled_time: None,
            location: None,
            status: Some(BookingStatus::Confirmed),
        }))
        .await
        .unwrap();
    platform.wait_for_settlements(2).await;

    let updated = platform.services.bookings.get_booking(&booking.id).unwrap();
    assert_eq!(updated.status, BookingStatus::Confirmed);

    let unrouted = Platform::start(false).await;
    assert_eq!(unrouted.dispatcher.states().get(Topic::BookingUpdated), None);
}

#[tokio::test]
async fn test_shutdown_settles_everything_it_started() {
    let platform = Platform::start(false).await;

    for i in 0..25 {
        platform
            .call(
                Method::POST,
                "/notifications",
                serde_json::json!({ "user_id": "u-1", "message": format!("n{}", i) }),
            )
            .await;
    }

    let report = platform.coordinator.shutdown().await;
    assert_eq!(report, DrainReport::Clean);

    // Whatever was handled was acked; nothing was handled without settling.
    let handled = platform.services.notifications.notifications_for("u-1").len();
    let settled = platform.broker.settlements_for(Topic::CreateNotification);
    assert_eq!(handled, settled.len());
    assert!(settled.iter().all(|s| s.outcome == Outcome::Acked));

    for (_, state) in platform.dispatcher.states().snapshot() {
        assert_eq!(state, SubscriptionState::Stopped);
    }
}
