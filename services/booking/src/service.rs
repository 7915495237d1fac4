//! Domain services invoked by the command dispatcher
//!
//! Every operation is safe to call from any subscription task. Records are
//! held in concurrent maps keyed by generated id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared::commands::{
    BookingStatus, CancelBooking, CreateBooking, CreateNotification, GeoPoint, ProcessPayment,
    SubmitReview, UpdateBooking,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::ranking::{RankingEntry, RankingStore};

pub const DEFAULT_POPULAR_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retrying later may succeed.
    Transient,
    /// Retrying the same command fails the same way.
    Permanent,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Unavailable(_) | DomainError::DeadlineExceeded(_) => ErrorKind::Transient,
            DomainError::NotFound { .. } | DomainError::Invalid(_) => ErrorKind::Permanent,
        }
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub status: BookingStatus,
    pub scheduled_time: DateTime<Utc>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub booking_id: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub user_id: String,
    pub provider_id: String,
    pub rating: f32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Operations
// =============================================================================

#[async_trait]
pub trait BookingOperations: Send + Sync {
    async fn create_booking(&self, request: CreateBooking) -> Result<Booking, DomainError>;
    async fn cancel_booking(&self, request: CancelBooking) -> Result<Booking, DomainError>;
    async fn update_booking(&self, request: UpdateBooking) -> Result<Booking, DomainError>;
}

#[async_trait]
pub trait PaymentOperations: Send + Sync {
    async fn create_payment(&self, request: ProcessPayment) -> Result<Payment, DomainError>;
}

#[async_trait]
pub trait ReviewOperations: Send + Sync {
    async fn create_review(&self, request: SubmitReview) -> Result<Review, DomainError>;
}

#[async_trait]
pub trait NotificationOperations: Send + Sync {
    async fn create_notification(
        &self,
        request: CreateNotification,
    ) -> Result<Notification, DomainError>;
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Bookings
// =============================================================================

pub struct BookingService {
    bookings: DashMap<String, Booking>,
    ranking: Arc<dyn RankingStore>,
}

impl BookingService {
    pub fn new(ranking: Arc<dyn RankingStore>) -> Self {
        Self {
            bookings: DashMap::new(),
            ranking,
        }
    }

    pub fn get_booking(&self, id: &str) -> Option<Booking> {
        self.bookings.get(id).map(|b| b.clone())
    }

    pub fn list_bookings(&self, user_id: &str) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.clone())
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        bookings
    }

    /// Most-booked services, best first.
    pub async fn popular_services(&self, limit: usize) -> Result<Vec<RankingEntry>, DomainError> {
        self.ranking
            .top_n(limit)
            .await
            .map_err(|e| DomainError::Unavailable(e.to_string()))
    }

    fn modify<F>(&self, id: &str, apply: F) -> Result<Booking, DomainError>
    where
        F: FnOnce(&mut Booking),
    {
        let mut booking = self.bookings.get_mut(id).ok_or_else(|| DomainError::NotFound {
            entity: "booking",
            id: id.to_string(),
        })?;
        apply(&mut *booking);
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }
}

#[async_trait]
impl BookingOperations for BookingService {
    async fn create_booking(&self, request: CreateBooking) -> Result<Booking, DomainError> {
        let now = Utc::now();
        let booking = Booking {
            id: new_id(),
            user_id: request.user_id,
            provider_id: request.provider_id,
            service_id: request.service_id,
            status: BookingStatus::Pending,
            scheduled_time: request.scheduled_time,
            location: request.location,
            created_at: now,
            updated_at: now,
        };
        self.bookings.insert(booking.id.clone(), booking.clone());

        // Popularity is best-effort; the booking stands either way.
        if let Err(e) = self.ranking.increment(&booking.service_id).await {
            tracing::warn!(
                service_id = %booking.service_id,
                error = %e,
                "Failed to bump service popularity"
            );
        }

        tracing::info!(booking_id = %booking.id, service_id = %booking.service_id, "Booking created");
        Ok(booking)
    }

    async fn cancel_booking(&self, request: CancelBooking) -> Result<Booking, DomainError> {
        let booking = self.modify(&request.id, |b| b.status = BookingStatus::Cancelled)?;
        tracing::info!(booking_id = %booking.id, "Booking cancelled");
        Ok(booking)
    }

    async fn update_booking(&self, request: UpdateBooking) -> Result<Booking, DomainError> {
        let booking = self.modify(&request.id, |b| {
            if let Some(time) = request.scheduled_time {
                b.scheduled_time = time;
            }
            if let Some(location) = request.location {
                b.location = location;
            }
            if let Some(status) = request.status {
                b.status = status;
            }
        })?;
        tracing::info!(booking_id = %booking.id, "Booking updated");
        Ok(booking)
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Default)]
pub struct PaymentService {
    payments: DashMap<String, Payment>,
}

impl PaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_payment(&self, id: &str) -> Option<Payment> {
        self.payments.get(id).map(|p| p.clone())
    }

    pub fn payments_for_booking(&self, booking_id: &str) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .map(|p| p.clone())
            .collect()
    }
}

#[async_trait]
impl PaymentOperations for PaymentService {
    async fn create_payment(&self, request: ProcessPayment) -> Result<Payment, DomainError> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(DomainError::Invalid(format!(
                "payment amount must be positive, got {}",
                request.amount
            )));
        }

        let now = Utc::now();
        let payment = Payment {
            id: new_id(),
            user_id: request.user_id,
            booking_id: request.booking_id,
            amount: request.amount,
            status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            transaction_id: request.transaction_id,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(payment.id.clone(), payment.clone());

        tracing::info!(payment_id = %payment.id, booking_id = %payment.booking_id, "Payment recorded");
        Ok(payment)
    }
}

// =============================================================================
// Reviews
// =============================================================================

#[derive(Default)]
pub struct ReviewService {
    reviews: DashMap<String, Review>,
}

impl ReviewService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reviews_for_provider(&self, provider_id: &str) -> Vec<Review> {
        self.reviews
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .map(|r| r.clone())
            .collect()
    }
}

#[async_trait]
impl ReviewOperations for ReviewService {
    async fn create_review(&self, request: SubmitReview) -> Result<Review, DomainError> {
        if !(1.0..=5.0).contains(&request.rating) {
            return Err(DomainError::Invalid(format!(
                "rating must be between 1 and 5, got {}",
                request.rating
            )));
        }

        let review = Review {
            id: new_id(),
            booking_id: request.booking_id,
            user_id: request.user_id,
            provider_id: request.provider_id,
            rating: request.rating,
            comment: request.comment,
            created_at: Utc::now(),
        };
        self.reviews.insert(review.id.clone(), review.clone());

        tracing::info!(review_id = %review.id, provider_id = %review.provider_id, "Review stored");
        Ok(review)
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Default)]
pub struct NotificationService {
    notifications: DashMap<String, Notification>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationOperations for NotificationService {
    async fn create_notification(
        &self,
        request: CreateNotification,
    ) -> Result<Notification, DomainError> {
        if request.message.trim().is_empty() {
            return Err(DomainError::Invalid("notification message is empty".to_string()));
        }

        let notification = Notification {
            id: new_id(),
            user_id: request.user_id,
            message: request.message,
            read: false,
            created_at: Utc::now(),
        };
        self.notifications
            .insert(notification.id.clone(), notification.clone());

        tracing::info!(notification_id = %notification.id, "Notification created");
        Ok(notification)
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// The domain services one booking process runs with.
#[derive(Clone)]
pub struct Services {
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentService>,
    pub reviews: Arc<ReviewService>,
    pub notifications: Arc<NotificationService>,
}

impl Services {
    pub fn new(ranking: Arc<dyn RankingStore>) -> Self {
        Self {
            bookings: Arc::new(BookingService::new(ranking)),
            payments: Arc::new(PaymentService::new()),
            reviews: Arc::new(ReviewService::new()),
            notifications: Arc::new(NotificationService::new()),
        }
    }
}
