//! In-process [`Store`] for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use askroom_core::{Message, MessageId, Room, RoomId};

use crate::error::StoreError;
use crate::store::Store;

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, Room>,
    room_order: Vec<RoomId>,
    messages: HashMap<MessageId, Message>,
    room_messages: HashMap<RoomId, Vec<MessageId>>,
}

/// Rooms and messages held in maps behind one lock, so every call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_message<T>(
        &self,
        id: &MessageId,
        f: impl FnOnce(&mut Message) -> T,
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.write();
        let message = inner
            .messages
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        Ok(f(message))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_room(&self, theme: &str) -> Result<Room, StoreError> {
        let room = Room {
            id: RoomId::new(),
            theme: theme.to_string(),
        };
        let mut inner = self.inner.write();
        inner.room_order.push(room.id);
        inner.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn get_room(&self, id: &RoomId) -> Result<Room, StoreError> {
        self.inner
            .read()
            .rooms
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {id}")))
    }

    async fn room_exists(&self, id: &RoomId) -> Result<bool, StoreError> {
        Ok(self.inner.read().rooms.contains_key(id))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .room_order
            .iter()
            .filter_map(|id| inner.rooms.get(id).cloned())
            .collect())
    }

    async fn create_message(&self, room_id: &RoomId, text: &str) -> Result<Message, StoreError> {
        let mut inner = self.inner.write();
        if !inner.rooms.contains_key(room_id) {
            return Err(StoreError::NotFound(format!("room {room_id}")));
        }
        let message = Message::new(*room_id, text);
        inner.room_messages.entry(*room_id).or_default().push(message.id);
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: &MessageId) -> Result<Message, StoreError> {
        self.inner
            .read()
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
    }

    async fn list_room_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read();
        let Some(ids) = inner.room_messages.get(room_id) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| inner.messages.get(id).cloned()).collect())
    }

    async fn increment_reaction(&self, id: &MessageId) -> Result<i64, StoreError> {
        self.update_message(id, |m| {
            m.reaction_count += 1;
            m.reaction_count
        })
    }

    async fn decrement_reaction(&self, id: &MessageId) -> Result<i64, StoreError> {
        self.update_message(id, |m| {
            m.reaction_count = (m.reaction_count - 1).max(0);
            m.reaction_count
        })
    }

    async fn mark_answered(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.update_message(id, |m| !std::mem::replace(&mut m.answered, true))
    }
}
