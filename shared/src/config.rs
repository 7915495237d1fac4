//! Environment-driven configuration
//!
//! Each service declares its own settings struct and defaults; this module
//! layers `<PREFIX>_*` environment variables (and an optional `.env` file)
//! over them.

use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ::config::ConfigError),
}

pub type Defaults = ConfigBuilder<DefaultState>;

/// Start a builder for service defaults.
pub fn defaults() -> Defaults {
    ::config::Config::builder()
}

/// Read `.env` if present, then resolve `T` from `defaults` overlaid with
/// `<PREFIX>_<FIELD>` variables.
pub fn from_env<T: DeserializeOwned>(prefix: &str, defaults: Defaults) -> Result<T, ConfigError> {
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }

    let settings = defaults
        .add_source(Environment::with_prefix(prefix).try_parsing(true))
        .build()?
        .try_deserialize()?;
    Ok(settings)
}
