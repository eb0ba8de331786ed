use std::sync::Arc;

use askroom_core::{Event, EventPayload, RoomId};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use crate::registry::{BroadcastReport, RoomRegistry};

/// Turns acknowledged writes into room events.
///
/// Call `notify` only after the store reported success, while holding the
/// room's [`write_lock`](Self::write_lock) taken before the store call. Events
/// of one room then leave in the order their writes completed. The broadcast
/// only pushes onto bounded queues, so holding the lock never makes a writer
/// wait on a watcher.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<RoomRegistry>,
    write_order: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            write_order: Arc::new(DashMap::new()),
        }
    }

    /// Serialise writes to `room_id` from the store call through `notify`.
    pub async fn write_lock(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.write_order.entry(room_id).or_default().value());
        lock.lock_owned().await
    }

    #[instrument(skip(self, payload), fields(room_id = %room_id, kind = %payload.kind()))]
    pub fn notify(&self, room_id: RoomId, payload: EventPayload) -> BroadcastReport {
        self.registry.broadcast(&Event::new(room_id, payload))
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}
