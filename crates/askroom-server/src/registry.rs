//! Room-scoped fan-out.
//!
//! Each room owns its own watcher set behind a mutex, so register, unregister
//! and broadcast on one room are mutually exclusive while unrelated rooms never
//! contend beyond a `DashMap` shard. Lock order is always shard, then room.

use std::collections::HashMap;
use std::sync::Arc;

use askroom_core::{Event, RoomId};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connection::{ConnectionHandle, ConnectionId};

type RoomSet = Arc<Mutex<HashMap<ConnectionId, Arc<ConnectionHandle>>>>;

/// Outcome of one broadcast pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Handles whose send failed; they were unregistered and closed.
    pub dropped: usize,
}

/// Tracks which live connections watch which room.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomSet>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the set of its room, creating the set if needed.
    pub fn register(&self, handle: Arc<ConnectionHandle>) {
        let room_id = handle.room_id;
        let conn_id = handle.id.clone();
        // Inserting while the shard entry is held keeps pruning from
        // detaching the set underneath us.
        let entry = self.rooms.entry(room_id).or_default();
        let watchers = {
            let mut set = entry.lock();
            let _ = set.insert(conn_id.clone(), handle);
            set.len()
        };
        drop(entry);
        debug!(room_id = %room_id, conn_id = %conn_id, watchers, "watcher registered");
    }

    /// Remove a handle. Returns `false` if it was not registered.
    pub fn unregister(&self, room_id: &RoomId, conn_id: &ConnectionId) -> bool {
        let Some(set) = self.room_set(room_id) else {
            return false;
        };
        let (removed, now_empty) = {
            let mut set = set.lock();
            let removed = set.remove(conn_id).is_some();
            (removed, set.is_empty())
        };
        if now_empty {
            self.prune(room_id);
        }
        if removed {
            debug!(room_id = %room_id, conn_id = %conn_id, "watcher unregistered");
        }
        removed
    }

    /// Deliver an event to every handle registered under its room.
    ///
    /// A failed send never aborts the pass: the failing handle is removed in
    /// the same critical section and its token fired, and the remaining
    /// watchers still receive the event. An absent room is a no-op.
    pub fn broadcast(&self, event: &Event) -> BroadcastReport {
        let room_id = event.room_id;
        let kind = event.kind();
        let Some(set) = self.room_set(&room_id) else {
            debug!(room_id = %room_id, %kind, recipients = 0, "broadcast to empty room");
            return BroadcastReport::default();
        };

        let payload = match event.to_wire() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(room_id = %room_id, %kind, error = %e, "failed to serialize event");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let now_empty = {
            let mut set = set.lock();
            let mut dead = Vec::new();
            for (conn_id, handle) in set.iter() {
                match handle.send(Arc::clone(&payload)) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!(room_id = %room_id, conn_id = %conn_id, %kind, error = %e, "dropping watcher after failed send");
                        dead.push(conn_id.clone());
                    }
                }
            }
            for conn_id in dead {
                if let Some(handle) = set.remove(&conn_id) {
                    handle.close();
                    report.dropped += 1;
                }
            }
            set.is_empty()
        };
        if now_empty {
            self.prune(&room_id);
        }

        debug!(
            room_id = %room_id,
            %kind,
            recipients = report.delivered,
            dropped = report.dropped,
            "broadcast event to room"
        );
        report
    }

    /// Number of watchers currently registered for a room.
    pub fn watcher_count(&self, room_id: &RoomId) -> usize {
        self.room_set(room_id).map_or(0, |set| set.lock().len())
    }

    pub fn contains(&self, room_id: &RoomId, conn_id: &ConnectionId) -> bool {
        self.room_set(room_id)
            .is_some_and(|set| set.lock().contains_key(conn_id))
    }

    /// Rooms with at least one watcher.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|entry| entry.value().lock().len()).sum()
    }

    fn room_set(&self, room_id: &RoomId) -> Option<RoomSet> {
        self.rooms.get(room_id).map(|entry| Arc::clone(entry.value()))
    }

    fn prune(&self, room_id: &RoomId) {
        let _ = self.rooms.remove_if(room_id, |_, set| set.lock().is_empty());
    }
}
