use std::path::Path;

use async_trait::async_trait;

use askroom_core::{Message, MessageId, Room, RoomId};

use crate::database::Database;
use crate::error::StoreError;
use crate::messages::MessageRepo;
use crate::rooms::RoomRepo;
use crate::store::Store;

/// [`Store`] backed by a single SQLite connection.
///
/// Queries are short and run on the calling task; the connection mutex keeps
/// each call atomic.
pub struct SqliteStore {
    db: Database,
    rooms: RoomRepo,
    messages: MessageRepo,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            rooms: RoomRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            db,
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_room(&self, theme: &str) -> Result<Room, StoreError> {
        self.rooms.create(theme)
    }

    async fn get_room(&self, id: &RoomId) -> Result<Room, StoreError> {
        self.rooms.get(id)
    }

    async fn room_exists(&self, id: &RoomId) -> Result<bool, StoreError> {
        self.rooms.exists(id)
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.rooms.list()
    }

    async fn create_message(&self, room_id: &RoomId, text: &str) -> Result<Message, StoreError> {
        self.messages.create(room_id, text)
    }

    async fn get_message(&self, id: &MessageId) -> Result<Message, StoreError> {
        self.messages.get(id)
    }

    async fn list_room_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError> {
        self.messages.list_for_room(room_id)
    }

    async fn increment_reaction(&self, id: &MessageId) -> Result<i64, StoreError> {
        self.messages.increment_reaction(id)
    }

    async fn decrement_reaction(&self, id: &MessageId) -> Result<i64, StoreError> {
        self.messages.decrement_reaction(id)
    }

    async fn mark_answered(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.messages.mark_answered(id)
    }
}
