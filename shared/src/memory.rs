//! In-process broker
//!
//! One FIFO queue per topic with a single consumer. Every settlement is
//! written to a ledger so callers can check how each message ended.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broker::{BoxDelivery, BrokerError, Delivery, MessageBroker, Subscription};
use crate::topics::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Rejected { requeue: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub message_id: u64,
    pub topic: Topic,
    pub delivery_count: u64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    id: u64,
    topic: Topic,
    payload: Bytes,
    delivery_count: u64,
}

struct Queue {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedMessage>>>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

pub struct InMemoryBroker {
    queues: DashMap<Topic, Arc<Queue>>,
    ledger: Arc<Mutex<Vec<Settlement>>>,
    published: Mutex<Vec<(Topic, Bytes)>>,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            ledger: Arc::new(Mutex::new(Vec::new())),
            published: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Simulate losing the broker connection. Later publishes and
    /// subscribes fail with [`BrokerError::Unavailable`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.ledger.lock().clone()
    }

    pub fn settlements_for(&self, topic: Topic) -> Vec<Settlement> {
        self.ledger
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .cloned()
            .collect()
    }

    /// Payloads accepted by `publish`, in publish order.
    pub fn published(&self, topic: Topic) -> Vec<Bytes> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn queue(&self, topic: Topic) -> Arc<Queue> {
        self.queues
            .entry(topic)
            .or_insert_with(|| Arc::new(Queue::new()))
            .clone()
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable)
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let message = QueuedMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            topic,
            payload: payload.clone(),
            delivery_count: 1,
        };
        self.queue(topic)
            .tx
            .send(message)
            .map_err(|e| BrokerError::Publish {
                topic,
                reason: e.to_string(),
            })?;
        self.published.lock().push((topic, payload));
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, BrokerError> {
        self.ensure_connected()?;

        let queue = self.queue(topic);
        let rx = queue.rx.lock().take().ok_or_else(|| BrokerError::Subscribe {
            topic,
            reason: "queue already has a consumer".to_string(),
        })?;
        let requeue = queue.tx.clone();
        let ledger = self.ledger.clone();

        let deliveries = stream::unfold(rx, move |mut rx| {
            let requeue = requeue.clone();
            let ledger = ledger.clone();
            async move {
                let message = rx.recv().await?;
                let delivery: BoxDelivery = Box::new(MemoryDelivery {
                    message,
                    requeue,
                    ledger,
                });
                Some((Ok(delivery), rx))
            }
        })
        .boxed();

        Ok(Subscription::new(topic, deliveries))
    }
}

struct MemoryDelivery {
    message: QueuedMessage,
    requeue: mpsc::UnboundedSender<QueuedMessage>,
    ledger: Arc<Mutex<Vec<Settlement>>>,
}

impl MemoryDelivery {
    fn record(&self, outcome: Outcome) {
        self.ledger.lock().push(Settlement {
            message_id: self.message.id,
            topic: self.message.topic,
            delivery_count: self.message.delivery_count,
            outcome,
        });
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn message_id(&self) -> String {
        self.message.id.to_string()
    }

    fn delivery_count(&self) -> u64 {
        self.message.delivery_count
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.record(Outcome::Acked);
        Ok(())
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<(), BrokerError> {
        self.record(Outcome::Rejected { requeue });
        if requeue {
            let mut message = self.message.clone();
            message.delivery_count += 1;
            self.requeue
                .send(message)
                .map_err(|e| BrokerError::Settle(e.to_string()))?;
        }
        Ok(())
    }
}
