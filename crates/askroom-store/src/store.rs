use async_trait::async_trait;

use askroom_core::{Message, MessageId, Room, RoomId};

use crate::error::StoreError;

/// Persistence capability the server depends on.
///
/// Every call either succeeds completely or fails with no partial effect.
/// Lookups of absent rows fail with [`StoreError::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_room(&self, theme: &str) -> Result<Room, StoreError>;

    async fn get_room(&self, id: &RoomId) -> Result<Room, StoreError>;

    async fn room_exists(&self, id: &RoomId) -> Result<bool, StoreError>;

    /// All rooms, oldest first.
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Fails with `NotFound` when the room does not exist.
    async fn create_message(&self, room_id: &RoomId, text: &str) -> Result<Message, StoreError>;

    async fn get_message(&self, id: &MessageId) -> Result<Message, StoreError>;

    /// Messages of one room in the order they were posted.
    async fn list_room_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError>;

    /// Returns the count after the increment.
    async fn increment_reaction(&self, id: &MessageId) -> Result<i64, StoreError>;

    /// Returns the count after the decrement. Clamps at zero.
    async fn decrement_reaction(&self, id: &MessageId) -> Result<i64, StoreError>;

    /// Returns `true` when the message went from unanswered to answered.
    async fn mark_answered(&self, id: &MessageId) -> Result<bool, StoreError>;
}
