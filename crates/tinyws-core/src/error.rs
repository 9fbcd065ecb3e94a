//! Protocol error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while negotiating or framing a WebSocket connection.
///
/// Every variant is fatal for the session that produced it: the unit of
/// recovery is the whole connection, never a single frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer did not send a usable HTTP upgrade request.
    #[error("not a websocket upgrade: {0}")]
    NotAWebSocketUpgrade(String),
    /// The server refused our upgrade request (client role).
    #[error("upgrade rejected: {0}")]
    UpgradeRejected(String),
    /// The stream ended before a frame header or payload was complete.
    #[error("stream ended before the frame was complete")]
    TruncatedFrame,
    /// The declared payload length exceeds the configured cap.
    #[error("frame payload of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Length declared in the frame header.
        length: u64,
        /// Configured maximum.
        max: usize,
    },
    /// No complete frame arrived within the idle window.
    #[error("no frame received within {0:?}")]
    IdleTimeout(Duration),
    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the error means the peer has gone away (reset, broken pipe, EOF).
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::TruncatedFrame => true,
            Self::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}

/// I/O error kinds that indicate a closed, reset, or stalled transport.
pub fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::TimedOut
    )
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
