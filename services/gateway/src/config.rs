//! Gateway settings, read from `GATEWAY_*` environment variables

use serde::Deserialize;
use shared::config::{self, ConfigError};
use shared::NatsSettings;

pub const ENV_PREFIX: &str = "GATEWAY";

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub nats_url: String,
    pub stream_name: String,
    pub log_json: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = config::defaults()
            .set_default("http_port", 8080)?
            .set_default("nats_url", "nats://localhost:4222")?
            .set_default("stream_name", "BOOKING_COMMANDS")?
            .set_default("log_json", false)?;

        config::from_env(ENV_PREFIX, defaults)
    }

    pub fn nats_settings(&self) -> NatsSettings {
        NatsSettings {
            stream_name: self.stream_name.clone(),
            consumer_prefix: "gateway".to_string(),
            ..NatsSettings::new(self.nats_url.clone())
        }
    }
}
