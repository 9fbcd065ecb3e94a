//! Demo policy settings.

use serde::{Deserialize, Serialize};

/// Timings for the echo and broadcast demos.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DemoSettings {
    /// Replies sent per inbound echo message.
    pub echo_repeats: u32,
    /// Pause between echo replies in milliseconds.
    pub echo_delay_ms: u64,
    /// Period of the broadcast ticker in milliseconds.
    pub broadcast_interval_ms: u64,
    /// Period of the statistics report in milliseconds.
    pub stats_interval_ms: u64,
    /// Path the broadcast subscribers connect to.
    pub broadcast_path: String,
    /// Clients launched by the broadcast demo.
    pub clients: usize,
    /// `Origin` header sent by demo clients.
    pub client_origin: String,
    /// Message that tells a demo client to stop.
    pub stop_word: String,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            echo_repeats: 3,
            echo_delay_ms: 100,
            broadcast_interval_ms: 1_000,
            stats_interval_ms: 10_000,
            broadcast_path: "/keepMeUpdatedPlease".to_string(),
            clients: 25_000,
            client_origin: "http://localhost:8080".to_string(),
            stop_word: "stop".to_string(),
        }
    }
}
