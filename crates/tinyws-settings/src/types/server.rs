//! Server and logging settings.

use serde::{Deserialize, Serialize};

/// Listener and per-session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket port (`0` picks a free port).
    pub port: u16,
    /// Idle read timeout per socket in milliseconds.
    pub read_timeout_ms: u64,
    /// Largest accepted frame payload in bytes.
    pub max_frame_size: usize,
    /// Largest accepted HTTP upgrade request head in bytes.
    pub max_handshake_bytes: usize,
    /// Frames queued per session before senders wait.
    pub outbound_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            read_timeout_ms: 30_000,
            max_frame_size: 16 * 1024 * 1024,
            max_handshake_bytes: 8 * 1024,
            outbound_queue: 64,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8081);
        assert_eq!(s.read_timeout_ms, 30_000);
        assert_eq!(s.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(s.max_handshake_bytes, 8192);
    }

    #[test]
    fn logging_defaults() {
        let l = LoggingSettings::default();
        assert_eq!(l.level, "info");
        assert!(!l.json);
    }
}
