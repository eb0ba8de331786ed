//! Subscription lifecycle: room check, registration, exactly-once teardown.

use std::sync::Arc;

use askroom_core::RoomId;
use askroom_store::{Store, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::connection::ConnectionHandle;
use crate::registry::RoomRegistry;

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Opens subscriptions against one registry.
///
/// Every subscription token is a child of the shutdown token, so firing the
/// latter ends all of them.
pub struct SubscriptionManager {
    store: Arc<dyn Store>,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
    queue_capacity: usize,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RoomRegistry>,
        shutdown: CancellationToken,
        queue_capacity: usize,
    ) -> Self {
        Self {
            store,
            registry,
            shutdown,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new watcher for `room_id`.
    pub async fn open(&self, room_id: RoomId) -> Result<Subscription, SubscribeError> {
        if !self.store.room_exists(&room_id).await? {
            return Err(SubscribeError::RoomNotFound(room_id));
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let handle = Arc::new(ConnectionHandle::new(room_id, tx, self.shutdown.child_token()));
        self.registry.register(Arc::clone(&handle));
        info!(room_id = %room_id, conn_id = %handle.id, "watcher subscribed");

        Ok(Subscription {
            handle,
            outbound: Some(rx),
            registry: Arc::clone(&self.registry),
        })
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}

/// A live registration. Dropping it is the teardown: the handle leaves the
/// registry and its token fires, whichever cause ended the subscription.
pub struct Subscription {
    handle: Arc<ConnectionHandle>,
    outbound: Option<mpsc::Receiver<Arc<String>>>,
    registry: Arc<RoomRegistry>,
}

impl Subscription {
    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    /// The queue the transport drains. Can be taken once.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<Arc<String>>> {
        self.outbound.take()
    }

    /// Fire the cancellation token. Safe to race with every other source.
    pub fn cancel(&self) {
        self.handle.close();
    }

    /// Resolves once the subscription was cancelled by any source.
    pub async fn done(&self) {
        self.handle.token().cancelled().await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self.registry.unregister(&self.handle.room_id, &self.handle.id);
        self.handle.close();
        info!(
            room_id = %self.handle.room_id,
            conn_id = %self.handle.id,
            was_registered = removed,
            sent = self.handle.sent_count(),
            "watcher unsubscribed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askroom_core::{Event, EventPayload, MessageId};
    use askroom_store::MemoryStore;
    use std::time::Duration;

    async fn setup() -> (SubscriptionManager, Arc<RoomRegistry>, CancellationToken, RoomId) {
        let store = Arc::new(MemoryStore::new());
        let room = store.create_room("lifecycle").await.unwrap();
        let registry = Arc::new(RoomRegistry::new());
        let shutdown = CancellationToken::new();
        let manager = SubscriptionManager::new(store, Arc::clone(&registry), shutdown.clone(), 8);
        (manager, registry, shutdown, room.id)
    }

    fn answered(room: RoomId) -> Event {
        Event::new(room, EventPayload::MessageAnswered { id: MessageId::new() })
    }

    #[tokio::test]
    async fn open_registers_and_drop_unregisters() {
        let (manager, registry, _shutdown, room) = setup().await;
        let sub = manager.open(room).await.unwrap();
        let conn_id = sub.handle().id.clone();
        assert!(registry.contains(&room, &conn_id));

        let token = sub.handle().token().clone();
        drop(sub);
        assert!(!registry.contains(&room, &conn_id));
        assert!(token.is_cancelled());
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn unknown_room_rejected() {
        let (manager, registry, _shutdown, _room) = setup().await;
        let err = manager.open(RoomId::new()).await.err().unwrap();
        assert!(matches!(err, SubscribeError::RoomNotFound(_)));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn outbound_receives_broadcasts() {
        let (manager, registry, _shutdown, room) = setup().await;
        let mut sub = manager.open(room).await.unwrap();
        let mut rx = sub.take_outbound().unwrap();
        assert!(sub.take_outbound().is_none());

        let _ = registry.broadcast(&answered(room));
        let raw = rx.recv().await.unwrap();
        assert!(raw.contains("message_answered"));
    }

    #[tokio::test]
    async fn done_resolves_on_explicit_cancel() {
        let (manager, _registry, _shutdown, room) = setup().await;
        let sub = manager.open(room).await.unwrap();
        sub.cancel();
        sub.cancel();
        tokio::time::timeout(Duration::from_secs(1), sub.done()).await.unwrap();
    }

    #[tokio::test]
    async fn done_resolves_on_shutdown() {
        let (manager, _registry, shutdown, room) = setup().await;
        let a = manager.open(room).await.unwrap();
        let b = manager.open(room).await.unwrap();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            a.done().await;
            b.done().await;
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn done_resolves_when_send_fails() {
        let (manager, registry, _shutdown, room) = setup().await;
        let mut sub = manager.open(room).await.unwrap();
        drop(sub.take_outbound());

        let report = registry.broadcast(&answered(room));
        assert_eq!(report.dropped, 1);
        tokio::time::timeout(Duration::from_secs(1), sub.done()).await.unwrap();

        // Teardown after the registry already removed the handle is harmless.
        drop(sub);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn cancelling_one_subscription_leaves_others() {
        let (manager, registry, _shutdown, room) = setup().await;
        let a = manager.open(room).await.unwrap();
        let b = manager.open(room).await.unwrap();
        a.cancel();
        drop(a);
        assert!(!b.handle().is_closed());
        assert_eq!(registry.watcher_count(&room), 1);
    }
}
