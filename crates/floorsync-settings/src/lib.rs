//! # floorsync-settings
//!
//! Configuration management with layered sources for the floorsync hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HubSettings::default()`]
//! 2. **User file**: `~/.floorsync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `FLOORSYNC_*` overrides (highest priority)
//!
//! There is no global settings cache: the binary loads once at startup and
//! hands the resulting value to the server and client constructors.
//!
//! # Usage
//!
//! ```no_run
//! use floorsync_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("hub port: {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
