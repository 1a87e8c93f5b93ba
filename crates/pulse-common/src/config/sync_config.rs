//! Sync layer configuration
//!
//! All tunables for the real-time core are supplied here at construction time;
//! there are no hidden globals. Values load from an optional TOML file layered
//! with `PULSE_*` environment variables.

use serde::Deserialize;
use std::time::Duration;

/// Configuration for the real-time sync layer
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// WebSocket endpoint, e.g. `wss://live.example.com/gateway`
    pub socket_url: String,
    /// REST base URL used for the fallback path and aggregate refresh
    pub rest_base_url: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Per-operation acknowledgment timeout in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Bound on the recent-items feed kept per event
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    /// Bound on the admission history retained per channel; the oldest entries
    /// are evicted beyond it and reconciled by the periodic refresh
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Reconnection policy: bounded attempts with exponential backoff
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay before the given attempt (1-based)
    ///
    /// Doubles from the base delay, capped at the ceiling.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1_u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Heartbeat liveness thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Silence beyond this is treated as a dead connection
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub timeout_ms: u64,
    /// Watchdog tick interval
    #[serde(default = "default_heartbeat_check_ms")]
    pub check_interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_heartbeat_timeout_ms(),
            check_interval_ms: default_heartbeat_check_ms(),
        }
    }
}

impl HeartbeatConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Periodic full aggregate refresh (correctness backstop)
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub interval_ms: u64,
    /// Disable the background refresh task entirely
    #[serde(default)]
    pub disabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_refresh_interval_ms(),
            disabled: false,
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// Default value functions
fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_feed_capacity() -> usize {
    50
}

fn default_channel_capacity() -> usize {
    500
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_check_ms() -> u64 {
    5000
}

fn default_refresh_interval_ms() -> u64 {
    60_000
}

impl SyncConfig {
    /// Load configuration from `config/{PULSE_ENV}.toml` (optional) layered with
    /// `PULSE_*` environment variables
    ///
    /// # Errors
    /// Returns an error if a source is malformed or required keys are missing.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let env = std::env::var("PULSE_ENV").unwrap_or_else(|_| "development".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(config::Environment::with_prefix("PULSE").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Build a config with the given endpoints and all defaults
    #[must_use]
    pub fn with_endpoints(socket_url: impl Into<String>, rest_base_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
            rest_base_url: rest_base_url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            refresh: RefreshConfig::default(),
            operation_timeout_ms: default_operation_timeout_ms(),
            feed_capacity: default_feed_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {0}")]
    Deserialize(String),
}
