//! # floorsync-client
//!
//! Client runtime for a floorsync hub.
//!
//! A [`HubClient`] owns one background task that dials the hub, announces
//! the configured [`Identity`](floorsync_core::Identity) once per physical
//! connection, and keeps reconnecting with exponential backoff until
//! [`HubClient::close`] is called.
//!
//! - **Status**: [`ConnectionStatus`] via [`HubClient::status`] and a
//!   `tokio::sync::watch` receiver
//! - **Presence**: latest [`PresenceSnapshot`](floorsync_core::PresenceSnapshot)
//! - **Subscriptions**: per kind, wildcard, or predicate ([`Subscription`])
//! - **Send**: fail-fast, [`ClientError::NotOpen`] while disconnected
//!
//! ## Crate Position
//!
//! Depends on `floorsync-core` and `floorsync-settings`. Nothing depends on it.

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod errors;
pub mod state;
pub mod subscriptions;

pub use client::HubClient;
pub use config::ClientConfig;
pub use errors::ClientError;
pub use state::{ConnectionStatus, PhaseEvent, SyncPhase};
pub use subscriptions::{Subscription, SubscriptionTable};
