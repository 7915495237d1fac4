//! Fire-and-forget command publisher
//!
//! A successful publish means the broker accepted the command for
//! processing. Nothing here waits for a consumer, and nothing is retried:
//! the caller decides what a failed publish means for its request.

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::broker::{BrokerError, MessageBroker};
use crate::commands::{
    CancelBooking, CodecError, Command, CreateBooking, CreateNotification, ProcessPayment,
    SubmitReview,
};
use crate::topics::{Topic, UnknownTopic};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    UnknownTopic(#[from] UnknownTopic),
    #[error(transparent)]
    Encode(#[from] CodecError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn MessageBroker>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    /// Publish an already-encoded command. The payload is not inspected.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let topic: Topic = topic.parse()?;
        self.send(topic, Bytes::copy_from_slice(payload)).await
    }

    pub async fn publish_command(&self, command: &Command) -> Result<(), PublishError> {
        let payload = command.encode()?;
        self.send(command.topic(), Bytes::from(payload)).await
    }

    pub async fn create_booking(&self, command: CreateBooking) -> Result<(), PublishError> {
        self.publish_command(&command.into()).await
    }

    pub async fn cancel_booking(&self, command: CancelBooking) -> Result<(), PublishError> {
        self.publish_command(&command.into()).await
    }

    pub async fn payment(&self, command: ProcessPayment) -> Result<(), PublishError> {
        self.publish_command(&command.into()).await
    }

    pub async fn review(&self, command: SubmitReview) -> Result<(), PublishError> {
        self.publish_command(&command.into()).await
    }

    pub async fn create_notification(
        &self,
        command: CreateNotification,
    ) -> Result<(), PublishError> {
        self.publish_command(&command.into()).await
    }

    async fn send(&self, topic: Topic, payload: Bytes) -> Result<(), PublishError> {
        let payload_size = payload.len();
        match self.broker.publish(topic, payload).await {
            Ok(()) => {
                tracing::info!(topic = %topic, payload_size, "Message published");
                Ok(())
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Failed to publish message");
                Err(e.into())
            }
        }
    }
}
