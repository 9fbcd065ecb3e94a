//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may name only the fields it wants to change.

mod demo;
mod server;

pub use demo::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090, "readTimeoutMs": 100000 },
///   "demo": { "clients": 1000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Listener and per-session limits.
    pub server: ServerSettings,
    /// Demo policy timings and client fleet size.
    pub demo: DemoSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.server.read_timeout_ms == 0, "server.readTimeoutMs must be positive"),
            (self.server.max_frame_size == 0, "server.maxFrameSize must be positive"),
            (self.server.max_handshake_bytes < 16, "server.maxHandshakeBytes must be at least 16"),
            (self.server.outbound_queue == 0, "server.outboundQueue must be positive"),
            (self.demo.broadcast_interval_ms == 0, "demo.broadcastIntervalMs must be positive"),
            (self.demo.stats_interval_ms == 0, "demo.statsIntervalMs must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(SettingsError::InvalidValue((*reason).to_string())),
            None => Ok(()),
        }
    }
}
