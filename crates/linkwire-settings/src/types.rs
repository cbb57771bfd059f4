//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields; missing fields keep their default.

use std::time::Duration;

use linkwire_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9300 },
///   "service": { "maxAttempts": 5 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkwireSettings {
    /// HTTP / WebSocket listener and live-channel liveness.
    pub server: ServerSettings,
    /// Database location and pool.
    pub store: StoreSettings,
    /// Connection service and fanout tuning.
    pub service: ServiceSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl LinkwireSettings {
    /// Reject combinations that would make liveness checks meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.server.heartbeat_timeout_ms < self.server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutMs ({}) is shorter than server.heartbeatIntervalMs ({})",
                self.server.heartbeat_timeout_ms, self.server.heartbeat_interval_ms
            )));
        }
        if self.service.max_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "service.maxAttempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and live-channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// Maximum live channels across all users.
    pub max_connections: usize,
    /// Ping interval for live channels.
    pub heartbeat_interval_ms: u64,
    /// A channel with no pong for this long is considered dead.
    pub heartbeat_timeout_ms: u64,
    /// How often the presence sweeper runs.
    pub sweep_interval_ms: u64,
    /// Consecutive push failures before a channel is evicted.
    pub max_push_failures: u32,
    /// Outbound frame buffer per channel.
    pub channel_buffer: usize,
    /// Grace period for draining connections on shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9300,
            max_connections: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            sweep_interval_ms: 15_000,
            max_push_failures: 3,
            channel_buffer: 256,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerSettings {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a [`Duration`].
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// Database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file path. Relative paths resolve against `~/.linkwire`.
    /// `:memory:` selects a private in-memory database.
    pub db_path: String,
    /// Pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "linkwire.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Connection service and fanout settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    /// Compare-and-swap attempts before reporting contention.
    pub max_attempts: u32,
    /// Upper bound for one live push.
    pub push_timeout_ms: u64,
    /// Undelivered notifications replayed to a newly registered channel.
    pub replay_limit: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            push_timeout_ms: 250,
            replay_limit: 100,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
