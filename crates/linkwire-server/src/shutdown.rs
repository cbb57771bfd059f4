//! Server lifecycle: one cancellation signal for the listener, the presence
//! sweeper and every live session, plus a tracker for work that has to finish
//! before the process exits (sessions flushing their close frame, pushes to
//! the non-acting participant).

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Owns the shutdown signal and the set of in-flight background work.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with nothing in flight.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Token for one long-running task. Cancelled on shutdown, and cancelling
    /// it only stops that task.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Resolves once shutdown starts. Handed to the HTTP listener.
    pub fn cancelled(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Tracker for background work [`drain`](Self::drain) waits on.
    pub fn tracker(&self) -> TaskTracker {
        self.tasks.clone()
    }

    /// Wrap a live session so [`drain`](Self::drain) waits for it. The
    /// session itself is spawned by the WebSocket upgrade.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.tasks.track_future(session)
    }

    /// Sessions and background pushes still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!(in_flight = self.in_flight(), "shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait up to `timeout` for tracked work. Returns
    /// `false` if something was still running when the time ran out.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok() {
            info!("all sessions and pushes finished");
            true
        } else {
            warn!(
                in_flight = self.in_flight(),
                ?timeout,
                "gave up waiting for sessions and pushes"
            );
            false
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
