//! Sessions, the connection registry, presence, relay and the per-socket
//! connection task.

pub mod broadcast;
pub mod connection;
pub mod heartbeat;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod session;
