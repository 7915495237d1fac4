pub mod broker;
pub mod commands;
pub mod config;
pub mod logger;
pub mod memory;
pub mod nats;
pub mod publisher;
pub mod signal;
pub mod topics;

#[cfg(test)]
mod tests;

pub use broker::{BoxDelivery, BrokerError, Delivery, MessageBroker, Subscription};
pub use commands::{CodecError, Command};
pub use memory::InMemoryBroker;
pub use nats::{NatsBroker, NatsSettings};
pub use publisher::{PublishError, Publisher};
pub use topics::Topic;
