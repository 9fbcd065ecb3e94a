//! Server and send-path error types.

use std::io;

use thiserror::Error;
use tinyws_core::error::is_disconnect_kind;

/// Errors from configuring or starting a [`WsServer`](crate::WsServer).
#[derive(Debug, Error)]
pub enum ServerError {
    /// `route` was called after `listen`.
    #[error("routes cannot be added after the server has started listening")]
    RoutesFrozen,
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Any other I/O failure on the listener.
    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for server setup.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Failure to deliver a frame through a [`SenderHandle`](crate::SenderHandle).
#[derive(Debug, Error)]
pub enum SendError {
    /// The session is closed or its writer has stopped.
    #[error("transport closed")]
    TransportClosed,
    /// The write itself failed for a reason other than disconnection.
    #[error("write failed: {0}")]
    Io(io::Error),
}

impl SendError {
    /// Whether the handle should be considered permanently dead.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }
}

impl From<io::Error> for SendError {
    fn from(err: io::Error) -> Self {
        if is_disconnect_kind(err.kind()) {
            Self::TransportClosed
        } else {
            Self::Io(err)
        }
    }
}

/// Failure raised by a [`MessagePolicy`](crate::MessagePolicy).
///
/// Terminates the session that dispatched the message, and nothing else.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A reply could not be sent.
    #[error(transparent)]
    Send(#[from] SendError),
    /// Policy-specific failure.
    #[error("policy failed: {0}")]
    Policy(String),
    /// The policy panicked while handling a message.
    #[error("policy panicked: {0}")]
    Panicked(String),
}
