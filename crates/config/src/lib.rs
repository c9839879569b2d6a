//! Configuration management for the voice gateway
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (`VOICE_GATEWAY_` prefix, `__` separator)
//! - The deployment variables `PORT` and `REQUIRE_AUTH` as final overrides

pub mod settings;

pub use settings::{
    load_settings, AdapterConfig, DeadlineConfig, ObservabilityConfig, PersistenceConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
