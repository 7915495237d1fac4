pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod ranking;
pub mod routing;
pub mod service;
pub mod shutdown;


pub use config::BookingConfig;
pub use dispatcher::{DeliveryOutcome, DispatchError, DispatchPolicy, Dispatcher, SubscriptionState};
pub use handlers::CommandHandler;
pub use ranking::{InMemoryRankingStore, RankingEntry, RankingStore, RedisRankingStore};
pub use routing::RoutingTable;
pub use service::{DomainError, ErrorKind, Services};
pub use shutdown::{shutdown_signal, DrainReport, ShutdownCoordinator};
