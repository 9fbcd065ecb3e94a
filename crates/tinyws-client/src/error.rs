//! Client error types.

use thiserror::Error;
use tinyws_core::ProtocolError;

/// Errors from a [`WsClient`](crate::WsClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The URL is not `ws://host[:port][/path]`.
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),
    /// The server did not accept the upgrade.
    #[error("handshake failed: {0}")]
    Handshake(ProtocolError),
    /// Framing failed after the upgrade.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
