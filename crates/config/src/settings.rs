//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use voice_gateway_core::{AudioConfig, VoiceConfig};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// External adapter endpoints and options
    #[serde(default)]
    pub adapters: AdapterConfig,

    /// Per-phase deadlines for external calls
    #[serde(default)]
    pub deadlines: DeadlineConfig,

    /// Persistence configuration (ScyllaDB)
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Refuse unauthenticated turns and reject upgrades without a valid token
    #[serde(default)]
    pub require_auth: bool,

    /// Allowed CORS origins; empty means localhost fallback
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Disable to allow all origins (development only)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Outbound frame queue depth per connection; exceeding it closes the
    /// connection with policy-violation (backpressure high-water mark)
    #[serde(default = "default_send_queue_depth")]
    pub send_queue_depth: usize,

    /// Control frames buffered while a turn is in flight
    #[serde(default = "default_pending_frame_limit")]
    pub pending_frame_limit: usize,
}

fn default_port() -> u16 {
    7000
}

fn default_true() -> bool {
    true
}

fn default_send_queue_depth() -> usize {
    64
}

fn default_pending_frame_limit() -> usize {
    32
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            require_auth: false,
            cors_origins: Vec::new(),
            cors_enabled: default_true(),
            send_queue_depth: default_send_queue_depth(),
            pending_frame_limit: default_pending_frame_limit(),
        }
    }
}

/// External adapter endpoints and call options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Identity provider token-verification endpoint
    #[serde(default = "default_identity_url")]
    pub identity_url: String,

    /// STT service base URL
    #[serde(default = "default_stt_url")]
    pub stt_url: String,

    /// TTS service base URL
    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    /// Query resolver base URL
    #[serde(default = "default_resolver_url")]
    pub resolver_url: String,

    /// Optional API key forwarded to the speech services
    #[serde(default)]
    pub api_key: Option<String>,

    /// Recognition options for inbound utterances
    #[serde(default)]
    pub audio: AudioConfig,

    /// Synthesis options for assistant replies
    #[serde(default)]
    pub voice: VoiceConfig,
}

fn default_identity_url() -> String {
    "http://127.0.0.1:8089".to_string()
}

fn default_stt_url() -> String {
    "http://127.0.0.1:8091".to_string()
}

fn default_tts_url() -> String {
    "http://127.0.0.1:8092".to_string()
}

fn default_resolver_url() -> String {
    "http://127.0.0.1:8093".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            identity_url: default_identity_url(),
            stt_url: default_stt_url(),
            tts_url: default_tts_url(),
            resolver_url: default_resolver_url(),
            api_key: None,
            audio: AudioConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

/// Per-phase deadlines for external calls, in milliseconds
///
/// Exceeding a deadline is classified as that phase's failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    #[serde(default = "default_stt_deadline_ms")]
    pub stt_ms: u64,

    #[serde(default = "default_query_deadline_ms")]
    pub query_ms: u64,

    #[serde(default = "default_tts_deadline_ms")]
    pub tts_ms: u64,

    #[serde(default = "default_store_deadline_ms")]
    pub store_ms: u64,
}

fn default_stt_deadline_ms() -> u64 {
    15_000
}

fn default_query_deadline_ms() -> u64 {
    20_000
}

fn default_tts_deadline_ms() -> u64 {
    15_000
}

fn default_store_deadline_ms() -> u64 {
    5_000
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            stt_ms: default_stt_deadline_ms(),
            query_ms: default_query_deadline_ms(),
            tts_ms: default_tts_deadline_ms(),
            store_ms: default_store_deadline_ms(),
        }
    }
}

/// Persistence configuration for ScyllaDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "voice_gateway".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// OTLP endpoint for distributed tracing (telemetry feature)
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub tracing_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            otlp_endpoint: None,
            tracing_enabled: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.send_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.send_queue_depth".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        for (field, value) in [
            ("deadlines.stt_ms", self.deadlines.stt_ms),
            ("deadlines.query_ms", self.deadlines.query_ms),
            ("deadlines.tts_ms", self.deadlines.tts_ms),
            ("deadlines.store_ms", self.deadlines.store_ms),
        ] {
            if value < 100 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Deadline too low ({}ms, minimum 100ms)", value),
                });
            }
            if value > 120_000 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Deadline too high ({}ms, maximum 120000ms)", value),
                });
            }
        }

        if !(0.25..=4.0).contains(&self.adapters.voice.speaking_rate) {
            return Err(ConfigError::InvalidValue {
                field: "adapters.voice.speaking_rate".to_string(),
                message: format!(
                    "Must be between 0.25 and 4.0, got {}",
                    self.adapters.voice.speaking_rate
                ),
            });
        }

        Ok(())
    }

    /// Apply the deployment environment variables the gateway documents:
    /// `PORT` and `REQUIRE_AUTH` ("true" to enforce).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring unparseable PORT"),
            }
        }
        if let Ok(require) = std::env::var("REQUIRE_AUTH") {
            self.server.require_auth = require.eq_ignore_ascii_case("true");
        }
    }
}

/// Load settings from files and environment
///
/// Priority: `PORT`/`REQUIRE_AUTH` > `VOICE_GATEWAY_*` env vars >
/// `config/{env}.yaml` > `config/default.yaml` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = Path::new("config/default.yaml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    if let Some(env_name) = env {
        let env_path = format!("config/{}.yaml", env_name);
        if Path::new(&env_path).exists() {
            builder = builder.add_source(File::with_name(&env_path));
        }
    }

    let config = builder
        .add_source(Environment::with_prefix("VOICE_GATEWAY").separator("__"))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let mut settings: Settings = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 7000);
        assert!(!settings.server.require_auth);
        assert_eq!(settings.deadlines.stt_ms, 15_000);
        assert_eq!(settings.deadlines.query_ms, 20_000);
        assert_eq!(settings.deadlines.store_ms, 5_000);
        assert!(!settings.persistence.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_queue_depth() {
        let mut settings = Settings::default();
        settings.server.send_queue_depth = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_low_deadline() {
        let mut settings = Settings::default();
        settings.deadlines.store_ms = 10;
        assert!(settings.validate().is_err());
    }
}
