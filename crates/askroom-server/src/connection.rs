//! One watcher's live connection as seen by the registry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use askroom_core::RoomId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a payload could not be queued for a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue full")]
    QueueFull,
    #[error("outbound queue closed")]
    Closed,
    #[error("connection cancelled")]
    Cancelled,
}

/// Registry-side record of a watcher.
///
/// The outbound queue is the transport sink: the socket pump drains it. Once
/// the token fires the handle is dead and every `send` fails.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub room_id: RoomId,
    tx: mpsc::Sender<Arc<String>>,
    cancel: CancellationToken,
    pub connected_at: Instant,
    /// Set by pongs, cleared by each heartbeat tick.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    sent: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(room_id: RoomId, tx: mpsc::Sender<Arc<String>>, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            room_id,
            tx,
            cancel,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            sent: AtomicU64::new(0),
        }
    }

    /// Queue a serialized event. Never waits.
    pub fn send(&self, payload: Arc<String>) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        match self.tx.try_send(payload) {
            Ok(()) => {
                let _ = self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Fire the cancellation token. Safe to call any number of times.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Payloads successfully queued so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Returns whether a pong arrived since the last check, and clears the flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle::new(RoomId::new(), tx, CancellationToken::new());
        (handle, rx)
    }

    #[test]
    fn connection_ids_are_prefixed_and_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert!(a.as_str().starts_with("conn_"));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_str());
    }

    #[tokio::test]
    async fn send_queues_payload() {
        let (handle, mut rx) = make_handle(4);
        handle.send(Arc::new("hello".into())).unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(handle.sent_count(), 1);
    }

    #[test]
    fn send_to_full_queue_fails() {
        let (handle, _rx) = make_handle(1);
        handle.send(Arc::new("one".into())).unwrap();
        assert_eq!(handle.send(Arc::new("two".into())), Err(SendError::QueueFull));
        assert_eq!(handle.sent_count(), 1);
    }

    #[test]
    fn send_to_closed_queue_fails() {
        let (handle, rx) = make_handle(4);
        drop(rx);
        assert_eq!(handle.send(Arc::new("x".into())), Err(SendError::Closed));
    }

    #[test]
    fn send_after_close_fails() {
        let (handle, _rx) = make_handle(4);
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(handle.send(Arc::new("x".into())), Err(SendError::Cancelled));
    }

    #[test]
    fn close_is_idempotent() {
        let (handle, _rx) = make_handle(4);
        handle.close();
        handle.close();
        assert!(handle.token().is_cancelled());
    }

    #[test]
    fn check_alive_resets_flag() {
        let (handle, _rx) = make_handle(4);
        assert!(handle.check_alive());
        assert!(!handle.check_alive());
        handle.mark_alive();
        assert!(handle.check_alive());
        assert!(handle.last_pong_elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn age_increases() {
        let (handle, _rx) = make_handle(4);
        let first = handle.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(handle.age() > first);
    }
}
