//! Collaborator traits: what a route does with messages, and who hears about
//! transport trouble.

use std::net::SocketAddr;

use async_trait::async_trait;
use tinyws_core::ProtocolError;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::websocket::sender::{SenderHandle, SessionId};

/// Identity and origin of an open session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session identity, shared with its [`SenderHandle`].
    pub id: SessionId,
    /// Remote address.
    pub peer: SocketAddr,
    /// Request path the session was routed by.
    pub path: String,
}

/// Handles text messages arriving on a route.
///
/// Called on the session's own task, one message at a time. Slow policies
/// delay only their own session.
#[async_trait]
pub trait MessagePolicy: Send + Sync {
    /// React to one text message.
    async fn on_message(
        &self,
        session: &SessionInfo,
        sender: &SenderHandle,
        payload: &str,
    ) -> Result<(), DispatchError>;
}

/// Receives transport-level events. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    /// A session finished its handshake.
    fn on_open(&self, _session: &SessionInfo) {}

    /// A session ended, for whatever reason.
    fn on_close(&self, _session: &SessionInfo) {}

    /// No frame arrived within the idle window.
    fn on_transport_timeout(&self, _session: &SessionInfo) {}

    /// Reading from the socket failed.
    fn on_transport_error(&self, _session: &SessionInfo, _error: &ProtocolError) {}

    /// The route's policy returned an error.
    fn on_dispatch_error(&self, _session: &SessionInfo, _error: &DispatchError) {}
}

/// Default observer: logs every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_open(&self, session: &SessionInfo) {
        debug!(session_id = %session.id, peer = %session.peer, path = %session.path, "session open");
    }

    fn on_close(&self, session: &SessionInfo) {
        debug!(session_id = %session.id, peer = %session.peer, "session closed");
    }

    fn on_transport_timeout(&self, session: &SessionInfo) {
        debug!(session_id = %session.id, peer = %session.peer, "session idle timeout");
    }

    fn on_transport_error(&self, session: &SessionInfo, error: &ProtocolError) {
        if error.is_disconnect() {
            debug!(session_id = %session.id, peer = %session.peer, %error, "peer went away");
        } else {
            warn!(session_id = %session.id, peer = %session.peer, %error, "transport error");
        }
    }

    fn on_dispatch_error(&self, session: &SessionInfo, error: &DispatchError) {
        warn!(session_id = %session.id, path = %session.path, %error, "policy failed");
    }
}

/// Fans each event out to several observers in order.
#[derive(Default)]
pub struct ObserverChain {
    observers: Vec<std::sync::Arc<dyn SessionObserver>>,
}

impl ObserverChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer.
    #[must_use]
    pub fn with(mut self, observer: std::sync::Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl SessionObserver for ObserverChain {
    fn on_open(&self, session: &SessionInfo) {
        self.observers.iter().for_each(|o| o.on_open(session));
    }

    fn on_close(&self, session: &SessionInfo) {
        self.observers.iter().for_each(|o| o.on_close(session));
    }

    fn on_transport_timeout(&self, session: &SessionInfo) {
        self.observers
            .iter()
            .for_each(|o| o.on_transport_timeout(session));
    }

    fn on_transport_error(&self, session: &SessionInfo, error: &ProtocolError) {
        self.observers
            .iter()
            .for_each(|o| o.on_transport_error(session, error));
    }

    fn on_dispatch_error(&self, session: &SessionInfo, error: &DispatchError) {
        self.observers
            .iter()
            .for_each(|o| o.on_dispatch_error(session, error));
    }
}
