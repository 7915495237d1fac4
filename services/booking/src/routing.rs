//! Topic → handler routing table
//!
//! Built once at startup and read-only afterwards. The dispatcher opens one
//! subscription per routed topic, so what is in this table is exactly what
//! the service consumes.

use shared::Topic;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::handlers::{
    CancelBookingHandler, CommandHandler, CreateBookingHandler, NotificationHandler,
    PaymentHandler, ReviewHandler, UpdateBookingHandler,
};
use crate::service::Services;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("topic {0} already has a handler")]
    Duplicate(Topic),
    #[error("routing table is empty")]
    Empty,
}

#[derive(Clone, Default)]
pub struct RoutingTable {
    routes: BTreeMap<Topic, Arc<dyn CommandHandler>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under the topic it declares.
    pub fn route(mut self, handler: Arc<dyn CommandHandler>) -> Result<Self, RoutingError> {
        let topic = handler.topic();
        if self.routes.contains_key(&topic) {
            return Err(RoutingError::Duplicate(topic));
        }
        self.routes.insert(topic, handler);
        Ok(self)
    }

    pub fn handler(&self, topic: Topic) -> Option<Arc<dyn CommandHandler>> {
        self.routes.get(&topic).cloned()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.routes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Topic, Arc<dyn CommandHandler>)> + '_ {
        self.routes.iter().map(|(topic, handler)| (*topic, handler.clone()))
    }

    /// The live topics, plus `booking_updated` when `route_updates` is set.
    pub fn for_services(services: &Services, route_updates: bool) -> Self {
        let mut routes: BTreeMap<Topic, Arc<dyn CommandHandler>> = BTreeMap::new();
        let handlers: [Arc<dyn CommandHandler>; 5] = [
            Arc::new(CreateBookingHandler::new(services.bookings.clone())),
            Arc::new(CancelBookingHandler::new(services.bookings.clone())),
            Arc::new(PaymentHandler::new(services.payments.clone())),
            Arc::new(ReviewHandler::new(services.reviews.clone())),
            Arc::new(NotificationHandler::new(services.notifications.clone())),
        ];
        for handler in handlers {
            routes.insert(handler.topic(), handler);
        }
        if route_updates {
            let handler: Arc<dyn CommandHandler> =
                Arc::new(UpdateBookingHandler::new(services.bookings.clone()));
            routes.insert(handler.topic(), handler);
        }
        Self { routes }
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.routes.keys()).finish()
    }
}
