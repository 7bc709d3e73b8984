//! Per-peer connection handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use roomcast_core::{ConnectionId, Frame, RelayError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle for one connected peer.
///
/// Outbound frames go through a bounded queue drained by the peer's writer
/// task; the queue is the per-member serialization point, so sequential
/// broadcasts reach the peer in order and a slow peer never blocks the
/// sender. `close` is idempotent and wakes the writer task to drop the
/// socket.
pub struct RoomConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Queue feeding this peer's writer task.
    tx: mpsc::Sender<Frame>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Cancelled exactly once, when the connection is closed.
    cancel: CancellationToken,
    /// When the last Pong (or any liveness signal) was received.
    last_pong: Mutex<Instant>,
    /// Count of frames dropped due to a full queue.
    dropped_frames: AtomicU64,
}

impl RoomConnection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            cancel: CancellationToken::new(),
            last_pong: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame for this peer without blocking.
    ///
    /// `QueueFull` means the frame is dropped but the peer stays connected;
    /// `QueueClosed` means the peer's writer is gone and the connection is
    /// dead.
    pub fn send(&self, frame: Frame) -> Result<(), RelayError> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::QueueClosed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RelayError::QueueClosed),
        }
    }

    /// Close the connection. Idempotent; wakes the writer task so the
    /// underlying socket is dropped.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub async fn wait_closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Record a liveness signal (pong or inbound activity).
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last liveness signal (or establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Total frames dropped for this peer because its queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
