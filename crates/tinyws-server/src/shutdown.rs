//! Cooperative shutdown via `CancellationToken`.
//!
//! Cancelling stops the accept loop and every ticker holding a token.
//! Sessions already accepted are not tracked; they end on their own through
//! peer close or the idle timeout.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the root cancellation token for a server process.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Fresh, uncancelled coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token cancelled with the root but cancellable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then wait up to `timeout` for `handles`, aborting the rest.
    ///
    /// Returns how many tasks had to be aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> usize {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = handles.len(), ?timeout, "shutting down");

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            return 0;
        }
        let stragglers = aborts.iter().filter(|h| !h.is_finished()).count();
        warn!(stragglers, ?timeout, "shutdown timed out, aborting remaining tasks");
        aborts.iter().for_each(tokio::task::AbortHandle::abort);
        stragglers
    }
}
