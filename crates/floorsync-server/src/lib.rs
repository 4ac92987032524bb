//! # floorsync-server
//!
//! Axum HTTP + `WebSocket` hub that keeps restaurant dashboards in sync.
//!
//! - `WebSocket` gateway: one session per socket, heartbeat, bounded outbound queues
//! - Connection registry guarded by a single mutex
//! - Presence publishing (`CONNECTED_USERS`) on every registry mutation
//! - Relay of application events to every connected session
//! - HTTP surface for the CRUD layer (`POST /events`), presence, health and metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::HubConfig;
pub use errors::{DeliveryError, RegistryError, ServerError};
pub use hub::Hub;
pub use server::HubServer;
