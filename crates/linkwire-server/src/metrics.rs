//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder globally.
///
/// Returns the handle used by `/metrics`. Fails if a recorder is already
/// installed in this process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle whose recorder is not installed globally. Used when metrics are
/// not wanted, and in tests.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render the Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names.

/// Live channels opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Live channels closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open live channels (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the server is full (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Sessions ended by a missed heartbeat (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
/// Live channel lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Channels evicted by the presence sweeper (counter).
pub const PRESENCE_EVICTIONS_TOTAL: &str = "presence_evictions_total";
/// Connection actions (counter, labels: action, outcome).
pub const CONNECTION_ACTIONS_TOTAL: &str = "connection_actions_total";
/// Lost compare-and-swap attempts (counter).
pub const CONNECTION_CAS_CONFLICTS_TOTAL: &str = "connection_cas_conflicts_total";
/// Connection action latency (histogram, labels: action).
pub const CONNECTION_ACTION_DURATION_SECONDS: &str = "connection_action_duration_seconds";
/// Events published (counter, labels: kind).
pub const FANOUT_EVENTS_TOTAL: &str = "fanout_events_total";
/// Notifications that could not be persisted (counter).
pub const FANOUT_PERSIST_FAILURES_TOTAL: &str = "fanout_persist_failures_total";
/// Live pushes that failed (counter, labels: reason).
pub const FANOUT_DELIVERY_FAILURES_TOTAL: &str = "fanout_delivery_failures_total";
/// Backlog notifications replayed on registration (counter).
pub const NOTIFICATIONS_REPLAYED_TOTAL: &str = "notifications_replayed_total";
