//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields take their production default.

mod server;

pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the hub.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 4100, "maxConnections": 64 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Hub server settings.
    pub server: ServerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Client runtime settings.
    pub client: ClientSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "floorsync".to_string(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
            client: ClientSettings::default(),
        }
    }
}

impl HubSettings {
    /// Correct inconsistent values.
    ///
    /// Called automatically during loading. Bad values are replaced with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        let server = &mut self.server;
        if server.outbound_queue_capacity == 0 {
            tracing::warn!("outbound_queue_capacity is 0, using 1");
            server.outbound_queue_capacity = 1;
        }
        if server.max_dropped_messages == 0 {
            tracing::warn!("max_dropped_messages is 0, using 1");
            server.max_dropped_messages = 1;
        }
        if server.heartbeat_timeout_ms < server.heartbeat_interval_ms {
            tracing::warn!(
                "heartbeat_timeout_ms ({}) < heartbeat_interval_ms ({}), correcting",
                server.heartbeat_timeout_ms,
                server.heartbeat_interval_ms
            );
            server.heartbeat_timeout_ms = server.heartbeat_interval_ms;
        }

        let client = &mut self.client;
        if client.max_backoff_ms < client.initial_backoff_ms {
            tracing::warn!(
                "client max_backoff_ms ({}) < initial_backoff_ms ({}), correcting",
                client.max_backoff_ms,
                client.initial_backoff_ms
            );
            client.max_backoff_ms = client.initial_backoff_ms;
        }

        if self.logging.level.trim().is_empty() {
            self.logging.level = LoggingSettings::default().level;
        }
    }
}

/// Log output configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit newline-delimited JSON instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Client runtime reconnect behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// First reconnect delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Reconnect delay cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Upper bound of the random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter_ms: 250,
        }
    }
}
