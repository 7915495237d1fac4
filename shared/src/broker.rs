//! Broker abstraction shared by the publisher and the dispatcher

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;

use crate::topics::Topic;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("broker unavailable")]
    Unavailable,
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: Topic, reason: String },
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: Topic, reason: String },
    #[error("receive on {topic} failed: {reason}")]
    Receive { topic: Topic, reason: String },
    #[error("settling delivery failed: {0}")]
    Settle(String),
}

/// One received message and its pending outcome.
///
/// Settling consumes the box, so a delivery is acknowledged or rejected at
/// most once. Dropping it unsettled leaves redelivery to the broker.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    /// Broker-assigned identifier, for logging only.
    fn message_id(&self) -> String;

    /// 1 on first delivery, incremented on each redelivery.
    fn delivery_count(&self) -> u64;

    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;

    async fn reject(self: Box<Self>, requeue: bool) -> Result<(), BrokerError>;
}

pub type BoxDelivery = Box<dyn Delivery>;

/// Binding between a topic and its stream of deliveries.
pub struct Subscription {
    topic: Topic,
    deliveries: BoxStream<'static, Result<BoxDelivery, BrokerError>>,
}

impl Subscription {
    pub fn new(topic: Topic, deliveries: BoxStream<'static, Result<BoxDelivery, BrokerError>>) -> Self {
        Self { topic, deliveries }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// `None` once the broker closes the subscription.
    pub async fn next(&mut self) -> Option<Result<BoxDelivery, BrokerError>> {
        self.deliveries.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}

/// Shared broker handle. Implementations synchronize internally; callers
/// hold it behind an `Arc` for the process lifetime.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BrokerError>;

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, BrokerError>;
}
