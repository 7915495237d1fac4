//! Command handlers: one per topic, each bound to a single domain operation

use async_trait::async_trait;
use shared::{Command, Topic};
use std::sync::Arc;

use crate::service::{
    BookingOperations, DomainError, NotificationOperations, PaymentOperations, ReviewOperations,
};

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The topic whose commands this handler accepts.
    fn topic(&self) -> Topic;

    /// Run the domain operation. Only success or failure is reported back.
    async fn handle(&self, command: Command) -> Result<(), DomainError>;
}

fn unexpected(topic: Topic, command: &Command) -> DomainError {
    DomainError::Invalid(format!(
        "{} handler received a {} command",
        topic,
        command.topic()
    ))
}

macro_rules! command_handler {
    ($name:ident, $ops:ident, $topic:expr, $variant:ident => $method:ident) => {
        pub struct $name {
            ops: Arc<dyn $ops>,
        }

        impl $name {
            pub fn new(ops: Arc<dyn $ops>) -> Self {
                Self { ops }
            }
        }

        #[async_trait]
        impl CommandHandler for $name {
            fn topic(&self) -> Topic {
                $topic
            }

            async fn handle(&self, command: Command) -> Result<(), DomainError> {
                match command {
                    Command::$variant(request) => self.ops.$method(request).await.map(|_| ()),
                    other => Err(unexpected($topic, &other)),
                }
            }
        }
    };
}

command_handler!(CreateBookingHandler, BookingOperations, Topic::CreateBooking, CreateBooking => create_booking);
command_handler!(CancelBookingHandler, BookingOperations, Topic::BookingCancelled, CancelBooking => cancel_booking);
command_handler!(UpdateBookingHandler, BookingOperations, Topic::BookingUpdated, UpdateBooking => update_booking);
command_handler!(PaymentHandler, PaymentOperations, Topic::PaymentProcessed, ProcessPayment => create_payment);
command_handler!(ReviewHandler, ReviewOperations, Topic::ReviewSubmitted, SubmitReview => create_review);
command_handler!(NotificationHandler, NotificationOperations, Topic::CreateNotification, CreateNotification => create_notification);
