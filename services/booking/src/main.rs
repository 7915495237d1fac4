use std::sync::Arc;

use booking_service::{
    shutdown_signal, BookingConfig, DispatchPolicy, Dispatcher, DrainReport, RankingStore,
    RedisRankingStore, RoutingTable, Services, ShutdownCoordinator,
};
use shared::logger::init_logger;
use shared::{MessageBroker, NatsBroker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BookingConfig::from_env()?;
    init_logger(config.log_json)?;

    // Without the broker there is nothing to consume.
    let broker: Arc<dyn MessageBroker> = match NatsBroker::connect(config.nats_settings()).await {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            tracing::error!(url = %config.nats_url, error = %e, "Failed to connect to broker");
            return Err(e.into());
        }
    };

    let ranking: Arc<dyn RankingStore> =
        Arc::new(RedisRankingStore::new(&config.redis_url, config.ranking_key.clone())?);
    let services = Services::new(ranking);
    let routes = RoutingTable::for_services(&services, config.route_booking_updated);

    let policy: DispatchPolicy = config.dispatch_policy();
    tracing::info!(
        routes = ?routes,
        handler_timeout = ?policy.handler_timeout,
        requeue_transient = policy.requeue_transient,
        drain_timeout = ?config.drain_timeout(),
        "Starting booking service"
    );

    let coordinator = ShutdownCoordinator::new(config.drain_timeout());
    let dispatcher = Dispatcher::new(broker, routes, policy);
    dispatcher.start(&coordinator).await?;

    match coordinator.run(shutdown_signal()).await {
        DrainReport::Clean => {
            match services.bookings.popular_services(config.popular_limit).await {
                Ok(top) => tracing::info!(popular = ?top, "Booking service stopped"),
                Err(e) => tracing::warn!(error = %e, "Booking service stopped; ranking unavailable"),
            }
            Ok(())
        }
        DrainReport::Forced { aborted } => {
            anyhow::bail!("forced shutdown, aborted consumers: {:?}", aborted)
        }
    }
}
