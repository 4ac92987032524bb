//! # floorsync-core
//!
//! Foundation types shared by the floorsync hub server and its client runtime.
//!
//! - **Branded IDs**: [`ids::SessionId`] as a newtype over a UUID v7 string
//! - **Wire messages**: [`messages::ApplicationMessage`] and its closed
//!   [`messages::MessageKind`] vocabulary
//! - **Presence**: [`messages::Identity`], [`messages::PresenceSnapshot`]
//! - **Errors**: [`errors::ProtocolError`] for malformed inbound frames
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other floorsync crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;

pub use errors::ProtocolError;
pub use ids::SessionId;
pub use messages::{ApplicationMessage, Identity, MessageKind, PresenceEntry, PresenceSnapshot};
