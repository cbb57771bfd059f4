//! Server configuration.

use std::time::Duration;

use linkwire_settings::LinkwireSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`LinkwireServer`](crate::server::LinkwireServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum live channels across all users.
    pub max_connections: usize,
    /// Ping interval.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a channel is dead.
    pub heartbeat_timeout_ms: u64,
    /// Presence sweeper period.
    pub sweep_interval_ms: u64,
    /// Consecutive failed pushes before eviction.
    pub max_push_failures: u32,
    /// Outbound frames buffered per channel.
    pub channel_buffer: usize,
    /// Upper bound for one live push.
    pub push_timeout_ms: u64,
    /// Compare-and-swap attempts per action.
    pub max_attempts: u32,
    /// Backlog entries replayed on registration.
    pub replay_limit: u32,
    /// Grace period for shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            sweep_interval_ms: 15_000,
            max_push_failures: 3,
            channel_buffer: 256,
            push_timeout_ms: 250,
            max_attempts: 3,
            replay_limit: 100,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &LinkwireSettings) -> Self {
        let server = &settings.server;
        let service = &settings.service;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval_ms: server.heartbeat_interval_ms,
            heartbeat_timeout_ms: server.heartbeat_timeout_ms,
            sweep_interval_ms: server.sweep_interval_ms,
            max_push_failures: server.max_push_failures,
            channel_buffer: server.channel_buffer,
            push_timeout_ms: service.push_timeout_ms,
            max_attempts: service.max_attempts,
            replay_limit: service.replay_limit,
            shutdown_timeout_ms: server.shutdown_timeout_ms,
        }
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Sweeper period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Push timeout.
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
