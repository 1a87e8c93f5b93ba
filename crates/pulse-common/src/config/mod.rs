//! Configuration structs

mod sync_config;

pub use sync_config::{
    ConfigError, HeartbeatConfig, ReconnectConfig, RefreshConfig, SyncConfig,
};
