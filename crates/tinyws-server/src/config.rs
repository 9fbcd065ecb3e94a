//! Server configuration.

use std::time::Duration;

use tinyws_core::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_HANDSHAKE_BYTES};
use tinyws_settings::ServerSettings;

/// Runtime configuration for a [`WsServer`](crate::WsServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-socket idle read timeout, also applied to the handshake.
    pub read_timeout: Duration,
    /// Largest accepted frame payload.
    pub max_frame_size: usize,
    /// Largest accepted upgrade request head.
    pub max_handshake_bytes: usize,
    /// Frames queued per session before senders wait.
    pub outbound_queue: usize,
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            read_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_handshake_bytes: DEFAULT_MAX_HANDSHAKE_BYTES,
            outbound_queue: 64,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
            max_frame_size: settings.max_frame_size,
            max_handshake_bytes: settings.max_handshake_bytes,
            outbound_queue: settings.outbound_queue.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_ephemeral_localhost() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn from_settings() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 8081,
            read_timeout_ms: 100_000,
            max_frame_size: 1024,
            max_handshake_bytes: 4096,
            outbound_queue: 0,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8081");
        assert_eq!(cfg.read_timeout, Duration::from_secs(100));
        assert_eq!(cfg.max_frame_size, 1024);
        assert_eq!(cfg.max_handshake_bytes, 4096);
        assert_eq!(cfg.outbound_queue, 1);
    }
}
