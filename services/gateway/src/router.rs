//! HTTP edge
//!
//! Write endpoints turn a request into a command and publish it. A 202 means
//! the broker holds the command; the booking service applies it later.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::commands::{
    CancelBooking, CreateBooking, CreateNotification, GeoPoint, ProcessPayment, SubmitReview,
};
use shared::Publisher;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::middleware::{request_logging, CallerId};

#[derive(Clone)]
pub struct AppState {
    pub publisher: Publisher,
}

impl AppState {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }
}

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub provider_id: String,
    pub service_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub location: GeoPoint,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub booking_id: String,
    pub amount: f64,
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub booking_id: String,
    pub provider_id: String,
    pub rating: f32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Accepted {
    pub status: String,
}

type AcceptedResponse = (StatusCode, Json<Accepted>);

fn accepted() -> AcceptedResponse {
    (
        StatusCode::ACCEPTED,
        Json(Accepted {
            status: "accepted".to_string(),
        }),
    )
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", delete(cancel_booking))
        .route("/payments", post(create_payment))
        .route("/reviews", post(create_review))
        .route("/notifications", post(create_notification))
        .layer(axum::middleware::from_fn(request_logging))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn create_booking(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<BookingRequest>,
) -> Result<AcceptedResponse, ApiError> {
    require("provider_id", &request.provider_id)?;
    require("service_id", &request.service_id)?;

    state
        .publisher
        .create_booking(CreateBooking {
            user_id,
            provider_id: request.provider_id,
            service_id: request.service_id,
            scheduled_time: request.scheduled_time,
            location: request.location,
        })
        .await?;
    Ok(accepted())
}

async fn cancel_booking(
    State(state): State<AppState>,
    CallerId(_user_id): CallerId,
    Path(id): Path<String>,
) -> Result<AcceptedResponse, ApiError> {
    state.publisher.cancel_booking(CancelBooking { id }).await?;
    Ok(accepted())
}

async fn create_payment(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<PaymentRequest>,
) -> Result<AcceptedResponse, ApiError> {
    require("booking_id", &request.booking_id)?;
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(ApiError::BadRequest("amount must be positive".to_string()));
    }

    state
        .publisher
        .payment(ProcessPayment {
            user_id,
            booking_id: request.booking_id,
            amount: request.amount,
            payment_method: request.payment_method,
            transaction_id: request.transaction_id,
        })
        .await?;
    Ok(accepted())
}

async fn create_review(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<ReviewRequest>,
) -> Result<AcceptedResponse, ApiError> {
    require("booking_id", &request.booking_id)?;

    state
        .publisher
        .review(SubmitReview {
            booking_id: request.booking_id,
            user_id,
            provider_id: request.provider_id,
            rating: request.rating,
            comment: request.comment,
        })
        .await?;
    Ok(accepted())
}

async fn create_notification(
    State(state): State<AppState>,
    CallerId(_caller): CallerId,
    Json(request): Json<NotificationRequest>,
) -> Result<AcceptedResponse, ApiError> {
    require("user_id", &request.user_id)?;

    state
        .publisher
        .create_notification(CreateNotification {
            user_id: request.user_id,
            message: request.message,
        })
        .await?;
    Ok(accepted())
}
