//! One live socket of a user.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use linkwire_core::ChannelId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of a bounded push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued for the socket writer.
    Delivered,
    /// Writer task is gone.
    Closed,
    /// Buffer stayed full for the whole timeout.
    TimedOut,
}

/// Sending half of a live channel, shared between the registry and the
/// socket session that owns the receiving half.
pub struct ClientChannel {
    /// Channel id, unique per socket.
    pub id: ChannelId,
    tx: mpsc::Sender<Arc<String>>,
    /// When the socket was accepted.
    pub connected_at: Instant,
    /// Set on every pong or inbound frame, cleared by heartbeat checks.
    pub is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    push_failures: AtomicU32,
    dropped: AtomicU64,
    closed: CancellationToken,
}

impl ClientChannel {
    /// Create a channel writing into `tx`.
    pub fn new(id: ChannelId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            push_failures: AtomicU32::new(0),
            dropped: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a frame without waiting. Returns `false` when the buffer is full
    /// or the writer is gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue a frame, waiting at most `timeout` for buffer space.
    ///
    /// A successful push resets the failure counter. Timeouts are counted by
    /// the caller through [`ClientChannel::record_failure`].
    pub async fn push(&self, frame: Arc<String>, timeout: Duration) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }
        match tokio::time::timeout(timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => {
                self.push_failures.store(0, Ordering::Relaxed);
                PushOutcome::Delivered
            }
            Ok(Err(_)) => PushOutcome::Closed,
            Err(_) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::TimedOut
            }
        }
    }

    /// Record activity from the client.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Read and clear the alive flag. `true` if the client was heard from
    /// since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the client was last heard from.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Count one failed push. Returns the new count.
    pub fn record_failure(&self) -> u32 {
        self.push_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Consecutive failed pushes.
    pub fn failure_count(&self) -> u32 {
        self.push_failures.load(Ordering::Relaxed)
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ask the owning session to end. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the channel was closed or its writer is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once [`ClientChannel::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

impl std::fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientChannel")
            .field("id", &self.id)
            .field("failures", &self.failure_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
