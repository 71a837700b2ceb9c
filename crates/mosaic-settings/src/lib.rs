//! # mosaic-settings
//!
//! Layered configuration for the Mosaic server.
//!
//! Settings are resolved from three layers, lowest priority first:
//! 1. **Compiled defaults**: [`MosaicSettings::default()`]
//! 2. **User file**: `~/.mosaic/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `CLOCK_*`, `SOCKET_REFRESH_DELAY`,
//!    `SECTION_UPDATE_DELAY` and `MOSAIC_*` overrides
//!
//! The resolved value is validated before it is returned and is then
//! passed explicitly to the server; there is no global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
