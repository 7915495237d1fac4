//! Consumer dispatcher
//!
//! One task per routed topic. Each task pulls a delivery, decodes it for its
//! topic, runs the handler under a deadline and settles the delivery exactly
//! once before pulling the next. Deliveries on one topic are therefore
//! processed strictly one at a time; different topics run concurrently.
//!
//! Settlement rules:
//! - handler success: ack
//! - undecodable payload: reject without requeue, handler not called
//! - handler failure: reject without requeue, unless transient requeue is
//!   enabled and the delivery is below its attempt limit

use dashmap::DashMap;
use shared::{BoxDelivery, BrokerError, Command, MessageBroker, Subscription, Topic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::handlers::CommandHandler;
use crate::routing::{RoutingError, RoutingTable};
use crate::service::{DomainError, ErrorKind};
use crate::shutdown::ShutdownCoordinator;

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DELIVERIES: u64 = 5;

/// Pause after a transport error before pulling again.
const RECEIVE_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("dispatcher already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Deadline for one handler invocation.
    pub handler_timeout: Duration,
    /// Requeue deliveries whose handler failed transiently.
    pub requeue_transient: bool,
    /// Attempts after which a transient failure is rejected for good.
    pub max_deliveries: u64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            requeue_transient: false,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }
}

impl DispatchPolicy {
    fn requeue(&self, error: &DomainError, delivery_count: u64) -> bool {
        self.requeue_transient
            && error.kind() == ErrorKind::Transient
            && delivery_count < self.max_deliveries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Rejected { requeue: bool },
}

/// Per-topic lifecycle, shared between the dispatcher and its tasks.
///
/// Every transition is kept, so the full path a subscription took can be
/// read back after it stopped.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStates(Arc<DashMap<Topic, Vec<SubscriptionState>>>);

impl SubscriptionStates {
    pub fn get(&self, topic: Topic) -> Option<SubscriptionState> {
        self.0.get(&topic).and_then(|trail| trail.last().copied())
    }

    /// Every state `topic` has been in, oldest first.
    pub fn history(&self, topic: Topic) -> Vec<SubscriptionState> {
        self.0.get(&topic).map(|trail| trail.clone()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(Topic, SubscriptionState)> {
        let mut states: Vec<_> = self
            .0
            .iter()
            .filter_map(|e| e.value().last().map(|state| (*e.key(), *state)))
            .collect();
        states.sort_by_key(|(topic, _)| *topic);
        states
    }

    fn set(&self, topic: Topic, state: SubscriptionState) {
        let mut trail = self.0.entry(topic).or_default();
        if trail.last() != Some(&state) {
            trail.push(state);
        }
    }
}

/// Marks its topic `Stopped` when dropped, including when the task owning
/// it is aborted mid-delivery.
struct StopOnExit {
    topic: Topic,
    states: SubscriptionStates,
}

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.states.set(self.topic, SubscriptionState::Stopped);
    }
}

pub struct Dispatcher {
    broker: Arc<dyn MessageBroker>,
    routes: RoutingTable,
    policy: DispatchPolicy,
    states: SubscriptionStates,
    started: AtomicBool,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn MessageBroker>, routes: RoutingTable, policy: DispatchPolicy) -> Self {
        let states = SubscriptionStates::default();
        for topic in routes.topics() {
            states.set(topic, SubscriptionState::Idle);
        }
        Self {
            broker,
            routes,
            policy,
            states,
            started: AtomicBool::new(false),
        }
    }

    pub fn states(&self) -> SubscriptionStates {
        self.states.clone()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Subscribe to every routed topic, then start one task per topic.
    ///
    /// All subscriptions are opened before any task starts: if one fails,
    /// nothing is consumed and the error is returned.
    pub async fn start(&self, coordinator: &ShutdownCoordinator) -> Result<(), DispatchError> {
        if self.routes.is_empty() {
            return Err(RoutingError::Empty.into());
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyStarted);
        }

        let mut workers = Vec::with_capacity(self.routes.len());
        for (topic, handler) in self.routes.iter() {
            let subscription = match self.broker.subscribe(topic).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "Failed to subscribe");
                    return Err(e.into());
                }
            };
            workers.push(SubscriptionWorker {
                subscription,
                handler,
                policy: self.policy.clone(),
                states: self.states.clone(),
            });
        }

        for worker in workers {
            let topic = worker.subscription.topic();
            self.states.set(topic, SubscriptionState::Running);
            let span = tracing::info_span!("consumer", topic = %topic);
            coordinator.spawn(topic, worker.run(coordinator.token()).instrument(span));
        }

        tracing::info!(topics = ?self.routes.topics(), "Dispatcher started");
        Ok(())
    }
}

struct SubscriptionWorker {
    subscription: Subscription,
    handler: Arc<dyn CommandHandler>,
    policy: DispatchPolicy,
    states: SubscriptionStates,
}

impl SubscriptionWorker {
    async fn run(mut self, shutdown: CancellationToken) {
        let topic = self.subscription.topic();
        let _stopped = StopOnExit {
            topic,
            states: self.states.clone(),
        };
        tracing::info!("Consumer started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.states.set(topic, SubscriptionState::Draining);
                    break;
                }
                next = self.subscription.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let work = process_delivery(topic, delivery, self.handler.as_ref(), &self.policy);
                    tokio::pin!(work);
                    tokio::select! {
                        _ = &mut work => {}
                        _ = shutdown.cancelled() => {
                            self.states.set(topic, SubscriptionState::Draining);
                            tracing::info!("Draining in-flight delivery");
                            work.await;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to receive delivery");
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.states.set(topic, SubscriptionState::Draining);
                            break;
                        }
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
                None => {
                    tracing::warn!("Subscription closed by broker");
                    break;
                }
            }
        }

        tracing::info!("Consumer stopped");
    }
}

/// Decode, handle and settle one delivery.
pub async fn process_delivery(
    topic: Topic,
    delivery: BoxDelivery,
    handler: &dyn CommandHandler,
    policy: &DispatchPolicy,
) -> DeliveryOutcome {
    let message_id = delivery.message_id();
    let delivery_count = delivery.delivery_count();
    let payload_size = delivery.payload().len();

    let decoded = Command::decode(topic, delivery.payload());
    let command = match decoded {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(
                topic = %topic,
                message_id = %message_id,
                payload_size,
                error = %e,
                "Rejecting undecodable message"
            );
            return settle(topic, &message_id, delivery, DeliveryOutcome::Rejected { requeue: false })
                .await;
        }
    };

    let started = Instant::now();
    let result = match tokio::time::timeout(policy.handler_timeout, handler.handle(command)).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::DeadlineExceeded(policy.handler_timeout)),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let outcome = match result {
        Ok(()) => {
            tracing::info!(
                topic = %topic,
                message_id = %message_id,
                delivery_count,
                elapsed_ms,
                "Command handled"
            );
            DeliveryOutcome::Acked
        }
        Err(e) => {
            let requeue = policy.requeue(&e, delivery_count);
            tracing::error!(
                topic = %topic,
                message_id = %message_id,
                delivery_count,
                elapsed_ms,
                kind = ?e.kind(),
                requeue,
                error = %e,
                "Command failed"
            );
            DeliveryOutcome::Rejected { requeue }
        }
    };

    settle(topic, &message_id, delivery, outcome).await
}

async fn settle(
    topic: Topic,
    message_id: &str,
    delivery: BoxDelivery,
    outcome: DeliveryOutcome,
) -> DeliveryOutcome {
    let result = match outcome {
        DeliveryOutcome::Acked => delivery.ack().await,
        DeliveryOutcome::Rejected { requeue } => delivery.reject(requeue).await,
    };
    if let Err(e) = result {
        tracing::error!(
            topic = %topic,
            message_id = %message_id,
            outcome = ?outcome,
            error = %e,
            "Failed to settle delivery"
        );
    }
    outcome
}
