//! Room membership and broadcast fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use roomcast_core::{ConnectionId, Frame};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::connection::RoomConnection;

/// Result of one broadcast fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Members whose queue accepted the frame.
    pub delivered: usize,
    /// Members kept but whose full queue dropped this frame.
    pub dropped: usize,
    /// Members removed and closed because their queue was gone.
    pub pruned: usize,
}

/// The guarded membership set for one room.
///
/// All structural access goes through the single lock; the lock is never
/// held across socket I/O — broadcast snapshots membership, releases the
/// lock, then fans out through non-blocking per-member queues.
pub struct RoomRegistry {
    room: String,
    members: RwLock<HashMap<ConnectionId, Arc<RoomConnection>>>,
    // Advisory mirror of members.len(), readable without the lock.
    len: AtomicUsize,
}

impl RoomRegistry {
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            members: RwLock::new(HashMap::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// The room this registry belongs to.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Current member count.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a connection. Re-adding the same handle is a no-op beyond
    /// replacing the entry under its own id.
    pub async fn add(&self, conn: Arc<RoomConnection>) {
        let mut members = self.members.write().await;
        let _ = members.insert(conn.id.clone(), conn);
        self.len.store(members.len(), Ordering::Relaxed);
    }

    /// Remove a connection and close its handle.
    ///
    /// Removal and close happen under the lock as one step: the map yields
    /// the entry to exactly one caller, so racing removals cannot
    /// double-close. Removing a non-member is a no-op.
    pub async fn remove(&self, id: &ConnectionId) -> bool {
        let mut members = self.members.write().await;
        let removed = members.remove(id);
        self.len.store(members.len(), Ordering::Relaxed);
        match removed {
            Some(conn) => {
                conn.close();
                debug!(room = %self.room, conn_id = %id, "connection removed");
                true
            }
            None => false,
        }
    }

    /// Whether the given connection is currently a member.
    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.members.read().await.contains_key(id)
    }

    /// Fan out one frame to every current member.
    ///
    /// Membership is snapshotted under the read lock, then each member gets
    /// one non-blocking queue send. A member whose queue is gone is removed
    /// and closed; a member whose queue is merely full keeps its membership
    /// and loses this frame. Failure on one member never affects delivery
    /// to the others, and the caller is never blocked by a slow consumer.
    pub async fn broadcast(&self, frame: &Frame) -> BroadcastOutcome {
        let snapshot: Vec<Arc<RoomConnection>> = {
            let members = self.members.read().await;
            members.values().cloned().collect()
        };

        let mut outcome = BroadcastOutcome::default();
        let mut dead: Vec<ConnectionId> = Vec::new();

        for conn in &snapshot {
            match conn.send(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(err) if err.is_terminal() => {
                    warn!(
                        room = %self.room,
                        conn_id = %conn.id,
                        kind = err.error_kind(),
                        "broadcast send failed, pruning member"
                    );
                    dead.push(conn.id.clone());
                }
                Err(err) => {
                    warn!(
                        room = %self.room,
                        conn_id = %conn.id,
                        kind = err.error_kind(),
                        dropped = conn.dropped_frames(),
                        "broadcast frame dropped"
                    );
                    outcome.dropped += 1;
                }
            }
        }

        for id in &dead {
            if self.remove(id).await {
                outcome.pruned += 1;
            }
        }

        outcome
    }
}
