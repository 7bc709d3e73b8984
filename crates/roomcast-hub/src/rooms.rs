//! Room index: maps room ids to registries, creating on first reference.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::RoomRegistry;

/// Maps a room id to its registry.
///
/// Registries are created lazily on first reference and, by default, never
/// destroyed — the index grows with the number of distinct ids ever seen.
/// `prune_empty` (and the opt-in sweep task) is the only reclaim path.
pub struct RoomIndex {
    rooms: DashMap<String, Arc<RoomRegistry>>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Return the registry for `room_id`, creating it atomically on first
    /// reference. Concurrent callers with the same id all get the same
    /// registry; exactly one is ever created per id. Empty ids are accepted
    /// here — validation is the entry point's concern.
    pub fn get_or_create(&self, room_id: &str) -> Arc<RoomRegistry> {
        if let Some(registry) = self.rooms.get(room_id) {
            return Arc::clone(&registry);
        }
        Arc::clone(
            self.rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(RoomRegistry::new(room_id)))
                .value(),
        )
    }

    /// Look up an existing registry without creating one.
    pub fn get(&self, room_id: &str) -> Option<Arc<RoomRegistry>> {
        self.rooms.get(room_id).map(|r| Arc::clone(&r))
    }

    /// Number of rooms ever referenced (minus any pruned).
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total connections across all rooms.
    pub fn total_connections(&self) -> usize {
        self.rooms.iter().map(|r| r.len()).sum()
    }

    /// Drop registries with no members. Returns how many were removed.
    pub fn prune_empty(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, registry| !registry.is_empty());
        before - self.rooms.len()
    }
}

impl Default for RoomIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a background task that periodically prunes empty rooms.
///
/// Off the default path — callers opt in via configuration; without this
/// task the index keeps the source's never-evict lifecycle.
pub fn start_room_sweep(
    index: Arc<RoomIndex>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = index.prune_empty();
                    if removed > 0 {
                        info!(removed, "idle room sweep");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    })
}
