use std::net::SocketAddr;
use std::sync::Arc;

use gateway_service::config::GatewayConfig;
use gateway_service::{create_router, AppState};
use shared::logger::init_logger;
use shared::signal::shutdown_signal;
use shared::{MessageBroker, NatsBroker, Publisher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    init_logger(config.log_json)?;

    let broker: Arc<dyn MessageBroker> = Arc::new(NatsBroker::connect(config.nats_settings()).await?);
    let app = create_router(AppState::new(Publisher::new(broker)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}
