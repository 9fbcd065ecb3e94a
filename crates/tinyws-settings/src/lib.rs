//! # tinyws-settings
//!
//! Layered configuration for the server, the demo policies, and logging:
//! compiled defaults, then `~/.tinyws/settings.json`, then `TINYWS_*`
//! environment variables.
//!
//! ```no_run
//! let settings = tinyws_settings::load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, load_with_env,
    settings_path,
};
pub use types::*;
