//! Counters for the broadcast demo.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tinyws_core::ProtocolError;

use crate::error::DispatchError;
use crate::hooks::{SessionInfo, SessionObserver};

/// Shared tallies for a demo run. Also counts server-side transport trouble
/// when installed as the server's observer.
#[derive(Debug)]
pub struct DemoStats {
    started: Instant,
    messages: Mutex<HashMap<usize, u64>>,
    reconnects: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
}

/// Point-in-time view of [`DemoStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    /// Whole seconds since the stats were created.
    pub elapsed_secs: u64,
    /// Clients that received at least one message.
    pub clients: usize,
    /// Mean messages per such client.
    pub average_messages: f64,
    /// Client reconnects.
    pub reconnects: u64,
    /// Unexpected client-side errors.
    pub client_errors: u64,
    /// Server-side timeouts, transport errors, and policy errors.
    pub server_errors: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} secs: ave message count per ws client: {:.2} \
             (Clients: {} initial, {} reconnects, {} clt excpts, {} svr excpts)",
            self.elapsed_secs,
            self.average_messages,
            self.clients,
            self.reconnects,
            self.client_errors,
            self.server_errors
        )
    }
}

impl DemoStats {
    /// Fresh counters starting now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            messages: Mutex::new(HashMap::new()),
            reconnects: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
        }
    }

    /// Client `client` received a message.
    pub fn record_message(&self, client: usize) {
        *self.messages.lock().entry(client).or_insert(0) += 1;
    }

    /// A client reconnected.
    pub fn record_reconnect(&self) {
        let _ = self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// A client hit an unexpected error.
    pub fn record_client_error(&self) {
        let _ = self.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// The server hit a timeout or error on some session.
    pub fn record_server_error(&self) {
        let _ = self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current totals.
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> StatsSnapshot {
        let (clients, total) = {
            let messages = self.messages.lock();
            (messages.len(), messages.values().sum::<u64>())
        };
        let average_messages = if clients == 0 {
            0.0
        } else {
            total as f64 / clients as f64
        };
        StatsSnapshot {
            elapsed_secs: self.started.elapsed().as_secs(),
            clients,
            average_messages,
            reconnects: self.reconnects.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for DemoStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionObserver for DemoStats {
    fn on_transport_timeout(&self, _session: &SessionInfo) {
        self.record_server_error();
    }

    fn on_transport_error(&self, _session: &SessionInfo, error: &ProtocolError) {
        // Peers hanging up is the normal end of a demo client.
        if !error.is_disconnect() {
            self.record_server_error();
        }
    }

    fn on_dispatch_error(&self, _session: &SessionInfo, _error: &DispatchError) {
        self.record_server_error();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::SessionId;

    #[test]
    fn empty_snapshot() {
        let snap = DemoStats::new().snapshot();
        assert_eq!(snap.clients, 0);
        assert!(snap.average_messages.abs() < f64::EPSILON);
    }

    #[test]
    fn average_over_clients() {
        let stats = DemoStats::new();
        stats.record_message(1);
        stats.record_message(1);
        stats.record_message(1);
        stats.record_message(2);
        stats.record_reconnect();
        stats.record_client_error();
        let snap = stats.snapshot();
        assert_eq!(snap.clients, 2);
        assert!((snap.average_messages - 2.0).abs() < f64::EPSILON);
        assert_eq!(snap.reconnects, 1);
        assert_eq!(snap.client_errors, 1);
    }

    #[test]
    fn observer_counts_server_errors_but_not_hangups() {
        let stats = DemoStats::new();
        let info = SessionInfo {
            id: SessionId::next(),
            peer: "127.0.0.1:3".parse().unwrap(),
            path: "/".into(),
        };
        stats.on_transport_timeout(&info);
        stats.on_transport_error(&info, &ProtocolError::TruncatedFrame);
        stats.on_transport_error(
            &info,
            &ProtocolError::FrameTooLarge {
                length: 10,
                max: 1,
            },
        );
        stats.on_dispatch_error(&info, &DispatchError::Policy("x".into()));
        assert_eq!(stats.snapshot().server_errors, 3);
    }

    #[test]
    fn display_format() {
        let snap = StatsSnapshot {
            elapsed_secs: 10,
            clients: 4,
            average_messages: 9.5,
            reconnects: 1,
            client_errors: 0,
            server_errors: 2,
        };
        assert_eq!(
            snap.to_string(),
            "10 secs: ave message count per ws client: 9.50 \
             (Clients: 4 initial, 1 reconnects, 0 clt excpts, 2 svr excpts)"
        );
    }
}
