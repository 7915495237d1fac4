//! Booking service settings, read from `BOOKING_*` environment variables

use serde::Deserialize;
use shared::config::{self, ConfigError};
use shared::NatsSettings;
use std::time::Duration;

use crate::dispatcher::DispatchPolicy;

pub const ENV_PREFIX: &str = "BOOKING";

/// Headroom between the handler deadline and the broker's redelivery timer.
pub const ACK_WAIT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub nats_url: String,
    pub stream_name: String,
    pub consumer_prefix: String,
    pub prefetch: usize,
    pub ack_wait_secs: u64,
    pub redis_url: String,
    pub ranking_key: String,
    pub handler_timeout_ms: u64,
    /// 0 waits for in-flight work indefinitely.
    pub drain_timeout_secs: u64,
    pub requeue_transient: bool,
    pub max_deliveries: u64,
    pub route_booking_updated: bool,
    pub popular_limit: usize,
    pub log_json: bool,
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = config::defaults()
            .set_default("nats_url", "nats://localhost:4222")?
            .set_default("stream_name", "BOOKING_COMMANDS")?
            .set_default("consumer_prefix", "booking-service")?
            .set_default("prefetch", 1)?
            .set_default("ack_wait_secs", 60)?
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("ranking_key", crate::ranking::DEFAULT_RANKING_KEY)?
            .set_default("handler_timeout_ms", 30_000)?
            .set_default("drain_timeout_secs", 0)?
            .set_default("requeue_transient", false)?
            .set_default("max_deliveries", 5)?
            .set_default("route_booking_updated", false)?
            .set_default("popular_limit", crate::service::DEFAULT_POPULAR_LIMIT as u64)?
            .set_default("log_json", false)?;

        config::from_env(ENV_PREFIX, defaults)
    }

    pub fn nats_settings(&self) -> NatsSettings {
        NatsSettings {
            url: self.nats_url.clone(),
            stream_name: self.stream_name.clone(),
            consumer_prefix: self.consumer_prefix.clone(),
            prefetch: self.prefetch.max(1),
            ack_wait: self.ack_wait(),
        }
    }

    /// Always longer than the handler deadline plus [`ACK_WAIT_MARGIN`]; the
    /// broker must not redeliver a command that is still being handled.
    pub fn ack_wait(&self) -> Duration {
        let configured = Duration::from_secs(self.ack_wait_secs);
        let floor = self.dispatch_policy().handler_timeout + ACK_WAIT_MARGIN;
        if configured < floor {
            tracing::warn!(
                configured = ?configured,
                handler_timeout = ?self.dispatch_policy().handler_timeout,
                ack_wait = ?floor,
                "Ack wait shorter than handler deadline; raising it"
            );
            return floor;
        }
        configured
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            handler_timeout: Duration::from_millis(self.handler_timeout_ms),
            requeue_transient: self.requeue_transient,
            max_deliveries: self.max_deliveries.max(1),
        }
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        (self.drain_timeout_secs > 0).then(|| Duration::from_secs(self.drain_timeout_secs))
    }
}
