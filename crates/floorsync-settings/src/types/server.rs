//! Hub server network and delivery settings.

use serde::{Deserialize, Serialize};

/// Hub server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP / WebSocket port (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrently admitted sessions; further upgrades get `503`.
    pub max_connections: usize,
    /// Capacity of each session's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Upper bound for one socket write, in milliseconds.
    pub send_timeout_ms: u64,
    /// Lifetime queue-full drops after which a session is evicted.
    pub max_dropped_messages: u64,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a peer is considered dead, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.port, 4000);
        assert_eq!(s.heartbeat_interval_ms, 30_000);
        assert_eq!(s.heartbeat_timeout_ms, 90_000);
        assert_eq!(s.max_message_size, 1024 * 1024);
    }

    #[test]
    fn deserialize_partial() {
        let s: ServerSettings =
            serde_json::from_str(r#"{"host":"127.0.0.1","sendTimeoutMs":250}"#).unwrap();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.send_timeout_ms, 250);
        assert_eq!(s.max_connections, 256);
    }
}
