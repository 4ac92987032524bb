//! Client configuration.

use std::time::Duration;

use floorsync_core::Identity;
use floorsync_settings::ClientSettings;

/// Default capacity of each subscription's buffer.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

/// Default capacity of the per-connection outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// How a [`HubClient`](crate::HubClient) reaches and announces itself to a hub.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket URL of the hub, e.g. `ws://127.0.0.1:4000/ws`.
    pub url: String,
    /// Identity announced on every new connection.
    pub identity: Identity,
    /// First reconnect delay.
    pub initial_backoff: Duration,
    /// Reconnect delay cap.
    pub max_backoff: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
    /// Buffered messages per subscription before new ones are dropped.
    pub subscription_capacity: usize,
    /// Buffered outbound messages per connection.
    pub outbound_capacity: usize,
}

impl ClientConfig {
    /// Config with default backoff.
    pub fn new(url: impl Into<String>, identity: Identity) -> Self {
        Self::from_settings(url, identity, &ClientSettings::default())
    }

    /// Config with backoff taken from loaded settings.
    pub fn from_settings(
        url: impl Into<String>,
        identity: Identity,
        settings: &ClientSettings,
    ) -> Self {
        Self {
            url: url.into(),
            identity,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms.max(1)),
            max_backoff: Duration::from_millis(
                settings.max_backoff_ms.max(settings.initial_backoff_ms).max(1),
            ),
            jitter: Duration::from_millis(settings.jitter_ms),
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Override the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration, jitter: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self.jitter = jitter;
        self
    }
}
