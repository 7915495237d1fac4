//! NATS JetStream transport
//!
//! All command subjects live on one work-queue stream. Every topic gets its
//! own durable pull consumer with explicit acks, so a topic's messages are
//! removed only when its consumer settles them.

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind,
};
use async_nats::{ConnectOptions, Event};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use std::time::Duration;

use crate::broker::{BoxDelivery, BrokerError, Delivery, MessageBroker, Subscription};
use crate::topics::Topic;

#[derive(Debug, Clone)]
pub struct NatsSettings {
    pub url: String,
    pub stream_name: String,
    pub consumer_prefix: String,
    pub prefetch: usize,
    pub ack_wait: Duration,
}

impl NatsSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_name: "BOOKING_COMMANDS".to_string(),
            consumer_prefix: "booking-service".to_string(),
            prefetch: 1,
            ack_wait: Duration::from_secs(60),
        }
    }
}

pub struct NatsBroker {
    jetstream: jetstream::Context,
    settings: NatsSettings,
}

impl NatsBroker {
    /// Connect and make sure the command stream exists. A broker that is
    /// unreachable here is fatal for the caller.
    pub async fn connect(settings: NatsSettings) -> Result<Self, BrokerError> {
        let client = ConnectOptions::new()
            .name(settings.consumer_prefix.as_str())
            .max_reconnects(None::<usize>)
            .reconnect_delay_callback(|attempts| {
                let base = Duration::from_millis(100);
                let max = Duration::from_secs(30);
                std::cmp::min(base * 2u32.pow(attempts.min(10) as u32), max)
            })
            .event_callback(|event| async move {
                match event {
                    Event::Disconnected => tracing::warn!("NATS disconnected"),
                    Event::Connected => tracing::info!("NATS connected"),
                    other => tracing::debug!(event = ?other, "NATS event"),
                }
            })
            .connect(settings.url.as_str())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let jetstream = jetstream::new(client);
        jetstream
            .get_or_create_stream(StreamConfig {
                name: settings.stream_name.clone(),
                description: Some("Booking platform write commands".to_string()),
                subjects: Topic::ALL.iter().map(|t| t.as_str().to_string()).collect(),
                retention: RetentionPolicy::WorkQueue,
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        tracing::info!(
            url = %settings.url,
            stream = %settings.stream_name,
            "Connected to NATS JetStream"
        );

        Ok(Self { jetstream, settings })
    }
}

#[async_trait]
impl MessageBroker for NatsBroker {
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BrokerError> {
        let publish_error = |e: &dyn std::fmt::Display| BrokerError::Publish {
            topic,
            reason: e.to_string(),
        };

        // Waits for the stream to persist the message, not for a consumer.
        let ack = self
            .jetstream
            .publish(topic.as_str().to_string(), payload)
            .await
            .map_err(|e| publish_error(&e))?;
        ack.await.map_err(|e| publish_error(&e))?;
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, BrokerError> {
        let subscribe_error = |e: &dyn std::fmt::Display| BrokerError::Subscribe {
            topic,
            reason: e.to_string(),
        };

        let stream = self
            .jetstream
            .get_stream(&self.settings.stream_name)
            .await
            .map_err(|e| subscribe_error(&e))?;

        let name = format!("{}-{}", self.settings.consumer_prefix, topic);
        let consumer = stream
            .get_or_create_consumer(
                &name,
                pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: topic.as_str().to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.settings.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| subscribe_error(&e))?;

        let messages = consumer
            .stream()
            .max_messages_per_batch(self.settings.prefetch.max(1))
            .messages()
            .await
            .map_err(|e| subscribe_error(&e))?;

        let deliveries = messages
            .map(move |item| {
                item.map(|message| Box::new(NatsDelivery { message }) as BoxDelivery)
                    .map_err(|e| BrokerError::Receive {
                        topic,
                        reason: e.to_string(),
                    })
            })
            .boxed();

        Ok(Subscription::new(topic, deliveries))
    }
}

struct NatsDelivery {
    message: jetstream::Message,
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn message_id(&self) -> String {
        self.message
            .info()
            .map(|info| info.stream_sequence.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn delivery_count(&self) -> u64 {
        self.message
            .info()
            .map(|info| info.delivered.max(1) as u64)
            .unwrap_or(1)
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Settle(e.to_string()))
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<(), BrokerError> {
        // Term tells JetStream never to redeliver; Nak asks for redelivery.
        let kind = if requeue { AckKind::Nak(None) } else { AckKind::Term };
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| BrokerError::Settle(e.to_string()))
    }
}
