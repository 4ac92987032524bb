//! Hub configuration.

use std::time::Duration;

use floorsync_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the hub and its HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum admitted sessions. Upgrades beyond this get `503`.
    pub max_connections: usize,
    /// Capacity of each session's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Upper bound for a single socket write, in milliseconds.
    pub send_timeout_ms: u64,
    /// Lifetime drops after which a session is evicted.
    pub max_dropped_messages: u64,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a peer after this much silence, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 256,
            outbound_queue_capacity: 256,
            send_timeout_ms: 5_000,
            max_dropped_messages: 100,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 1024 * 1024,
        }
    }
}

impl HubConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            outbound_queue_capacity: settings.outbound_queue_capacity.max(1),
            send_timeout_ms: settings.send_timeout_ms,
            max_dropped_messages: settings.max_dropped_messages.max(1),
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
            max_message_size: settings.max_message_size,
        }
    }

    /// Socket write timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Silence threshold.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}
