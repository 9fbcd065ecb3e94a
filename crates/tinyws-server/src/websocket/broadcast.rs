//! Fan-out of one text message to every registered session.
//!
//! The live set and the failed set share one short-held lock each; neither is
//! held across a write. A round snapshots the live handles, then hands each
//! one to its own task so a stalled peer only stalls itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tinyws_core::Frame;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::sender::{SenderHandle, SessionId};
use crate::error::SendError;
use crate::hooks::{SessionInfo, SessionObserver};
use crate::metrics::{
    WS_BROADCAST_FAILURES_TOTAL, WS_BROADCAST_RECIPIENTS, WS_BROADCAST_ROUNDS_TOTAL,
};

/// Outcome of one delivery inside a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Closed,
    Failed,
}

/// Totals for a finished round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Handles in the snapshot.
    pub recipients: usize,
    /// Writes that completed.
    pub delivered: usize,
    /// Writes that did not (closed sessions included).
    pub failed: usize,
}

/// Running counters across all rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Handles currently registered.
    pub registered: usize,
    /// Rounds started.
    pub rounds: u64,
    /// Deliveries that failed.
    pub failures: u64,
}

/// An in-flight round. Await [`BroadcastRound::finish`] for its report, or
/// drop it and let the deliveries run on their own.
#[must_use = "dropping a round detaches its deliveries"]
pub struct BroadcastRound {
    deliveries: Vec<JoinHandle<Delivery>>,
}

impl BroadcastRound {
    /// Number of handles the round is delivering to.
    pub fn recipients(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait for every delivery and tally the results.
    pub async fn finish(self) -> RoundReport {
        let mut report = RoundReport {
            recipients: self.deliveries.len(),
            ..RoundReport::default()
        };
        for outcome in futures::future::join_all(self.deliveries).await {
            match outcome {
                Ok(Delivery::Delivered) => report.delivered += 1,
                Ok(Delivery::Closed | Delivery::Failed) | Err(_) => report.failed += 1,
            }
        }
        report
    }
}

/// Registry of sessions that receive broadcasts.
pub struct Broadcaster {
    live: Mutex<HashMap<SessionId, SenderHandle>>,
    failed: Arc<Mutex<HashSet<SessionId>>>,
    rounds: AtomicU64,
    failures: Arc<AtomicU64>,
}

impl Broadcaster {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            failed: Arc::new(Mutex::new(HashSet::new())),
            rounds: AtomicU64::new(0),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add a handle. Registering the same session twice keeps one entry.
    ///
    /// Returns `true` if the session was not registered before.
    pub fn register(&self, handle: &SenderHandle) -> bool {
        let mut live = self.live.lock();
        let added = live.insert(handle.id(), handle.clone()).is_none();
        metrics::gauge!(WS_BROADCAST_RECIPIENTS).set(live.len() as f64);
        added
    }

    /// Remove a session explicitly.
    pub fn unregister(&self, id: SessionId) -> bool {
        let mut live = self.live.lock();
        let removed = live.remove(&id).is_some();
        metrics::gauge!(WS_BROADCAST_RECIPIENTS).set(live.len() as f64);
        removed
    }

    /// Drop every session whose delivery failed since the last compaction.
    ///
    /// Returns how many were removed.
    pub fn compact(&self) -> usize {
        let stale: Vec<SessionId> = self.failed.lock().drain().collect();
        if stale.is_empty() {
            return 0;
        }
        let mut live = self.live.lock();
        let removed = stale.iter().filter(|id| live.remove(id).is_some()).count();
        metrics::gauge!(WS_BROADCAST_RECIPIENTS).set(live.len() as f64);
        drop(live);
        debug!(removed, "compacted broadcast registry");
        removed
    }

    /// Start a round delivering `message` to every live session.
    ///
    /// Must be called inside a tokio runtime. A session whose handle reports
    /// [`SendError::TransportClosed`] is pruned at the next round.
    pub fn broadcast(&self, message: impl Into<Bytes>) -> BroadcastRound {
        let _ = self.compact();
        let snapshot: Vec<SenderHandle> = self.live.lock().values().cloned().collect();
        let _ = self.rounds.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(WS_BROADCAST_ROUNDS_TOTAL).increment(1);
        debug!(recipients = snapshot.len(), "broadcast round");

        let payload = message.into();
        let deliveries = snapshot
            .into_iter()
            .map(|handle| {
                let frame = Frame::text(payload.clone());
                let failed = Arc::clone(&self.failed);
                let failures = Arc::clone(&self.failures);
                tokio::spawn(async move {
                    let outcome = match handle.send_frame(frame).await {
                        Ok(()) => return Delivery::Delivered,
                        Err(SendError::TransportClosed) => Delivery::Closed,
                        Err(SendError::Io(error)) => {
                            warn!(session_id = %handle.id(), %error, "broadcast delivery failed");
                            Delivery::Failed
                        }
                    };
                    if outcome == Delivery::Closed {
                        let _ = failed.lock().insert(handle.id());
                    }
                    let _ = failures.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(WS_BROADCAST_FAILURES_TOTAL).increment(1);
                    outcome
                })
            })
            .collect();

        BroadcastRound { deliveries }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    /// Counters across all rounds so far.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            registered: self.len(),
            rounds: self.rounds.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed sessions leave the live set right away instead of waiting for a
/// failed delivery to prune them.
impl SessionObserver for Broadcaster {
    fn on_close(&self, session: &SessionInfo) {
        if self.unregister(session.id) {
            debug!(session_id = %session.id, "unsubscribed closed session");
        }
    }
}
