//! # linkwire-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LinkwireSettings::default()`]
//! 2. **User file**: `~/.linkwire/settings.json`, deep-merged over defaults
//! 3. **Environment**: `LINKWIRE_*` overrides
//!
//! Command-line flags of the `linkwire` binary are applied on top of the
//! loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, linkwire_home, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
