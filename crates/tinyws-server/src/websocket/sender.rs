//! Per-session send capability.
//!
//! Every session owns one writer task fed by a bounded queue. A
//! [`SenderHandle`] is a cloneable entry into that queue; each queued frame
//! carries a oneshot acknowledgement so the caller learns how the write went.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tinyws_core::Frame;
use tokio::sync::{mpsc, oneshot};

use crate::error::SendError;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// A frame waiting for the writer, with its acknowledgement channel.
#[derive(Debug)]
pub struct Outbound {
    /// Frame to write.
    pub frame: Frame,
    ack: oneshot::Sender<io::Result<()>>,
}

impl Outbound {
    /// Report the write outcome to the sender. The sender may have gone away.
    pub fn complete(self, result: io::Result<()>) {
        let _ = self.ack.send(result);
    }
}

/// Cloneable handle for writing frames to one session.
///
/// Equality and hashing follow the [`SessionId`].
#[derive(Clone)]
pub struct SenderHandle {
    id: SessionId,
    tx: mpsc::Sender<Outbound>,
}

impl SenderHandle {
    /// A handle for a fresh session plus the receiving end its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        Self::with_id(SessionId::next(), capacity)
    }

    pub(crate) fn with_id(id: SessionId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    /// Identity of the session behind this handle.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the writer has stopped accepting frames.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a text frame and wait until it is written.
    pub async fn send_text(&self, text: impl Into<Bytes>) -> Result<(), SendError> {
        self.send_frame(Frame::text(text)).await
    }

    /// Send a frame and wait until it is written.
    ///
    /// Waits for queue space when the session is backed up. Fails with
    /// [`SendError::TransportClosed`] once the session is closed.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound { frame, ack })
            .await
            .map_err(|_| SendError::TransportClosed)?;
        match done.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendError::from(e)),
            Err(_) => Err(SendError::TransportClosed),
        }
    }
}

impl fmt::Debug for SenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for SenderHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SenderHandle {}

impl std::hash::Hash for SenderHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tinyws_core::Opcode;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(a.to_string().starts_with("ws-"));
    }

    #[tokio::test]
    async fn send_waits_for_ack() {
        let (handle, mut rx) = SenderHandle::channel(4);
        let writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            assert_eq!(out.frame.opcode, Opcode::Text);
            assert_eq!(&out.frame.payload[..], b"hi");
            out.complete(Ok(()));
        });
        handle.send_text("hi").await.unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_is_transport_closed() {
        let (handle, rx) = SenderHandle::channel(4);
        drop(rx);
        assert!(handle.is_closed());
        assert_matches!(handle.send_text("x").await, Err(SendError::TransportClosed));
    }

    #[tokio::test]
    async fn unacknowledged_frame_is_transport_closed() {
        let (handle, mut rx) = SenderHandle::channel(4);
        let writer = tokio::spawn(async move {
            let out = rx.recv().await.unwrap();
            drop(out);
        });
        assert_matches!(handle.send_text("x").await, Err(SendError::TransportClosed));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn write_errors_are_classified() {
        let (handle, mut rx) = SenderHandle::channel(4);
        let _writer = tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            first.complete(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
            let second = rx.recv().await.unwrap();
            second.complete(Err(io::Error::other("odd")));
        });
        assert_matches!(handle.send_text("a").await, Err(SendError::TransportClosed));
        assert_matches!(handle.send_text("b").await, Err(SendError::Io(_)));
    }

    #[test]
    fn clones_share_identity() {
        let (handle, _rx) = SenderHandle::channel(1);
        let clone = handle.clone();
        assert_eq!(handle, clone);
        let (other, _rx2) = SenderHandle::channel(1);
        assert_ne!(handle, other);
    }
}
