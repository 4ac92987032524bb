//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Build a handle without installing a global recorder.
///
/// Metrics recorded through the `metrics` macros do not reach this handle;
/// used where a server needs a `/metrics` route but must not touch global
/// state (tests, embedded hubs).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format from the recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants shared by the hub and connection tasks.

/// WebSocket sessions opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently open WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Messages dropped on a full outbound queue (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Session lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrades refused because the hub was full (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Application messages relayed (counter, labels: kind).
pub const HUB_RELAYED_MESSAGES_TOTAL: &str = "hub_relayed_messages_total";
/// Presence snapshots published (counter).
pub const HUB_PRESENCE_PUBLISHES_TOTAL: &str = "hub_presence_publishes_total";
/// Inbound frames rejected as protocol errors (counter, labels: reason).
pub const HUB_PROTOCOL_ERRORS_TOTAL: &str = "hub_protocol_errors_total";
/// Sessions evicted for a closed or persistently full queue (counter).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
