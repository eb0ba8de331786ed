use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;

use askroom_core::{Message, MessageId, RoomId};

use crate::database::Database;
use crate::error::StoreError;

const SELECT_COLUMNS: &str = "SELECT id, room_id, message, reaction_count, answered FROM messages";

pub struct MessageRepo {
    db: Database,
}

fn parse_id<T: std::str::FromStr>(raw: &str, column: &'static str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| StoreError::CorruptRow {
        table: "messages",
        column,
        detail: e.to_string(),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, StoreError> {
    let id: String = row.get(0)?;
    let room_id: String = row.get(1)?;
    Ok(Message {
        id: parse_id(&id, "id")?,
        room_id: parse_id(&room_id, "room_id")?,
        message: row.get(2)?,
        reaction_count: row.get(3)?,
        answered: row.get(4)?,
    })
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a message. The room must exist.
    #[instrument(skip(self, text), fields(room_id = %room_id))]
    pub fn create(&self, room_id: &RoomId, text: &str) -> Result<Message, StoreError> {
        let message = Message::new(*room_id, text);
        self.db.with_conn(|conn| {
            let room_found = conn
                .query_row("SELECT 1 FROM rooms WHERE id = ?1", [room_id.to_string()], |_| Ok(()))
                .optional()?;
            if room_found.is_none() {
                return Err(StoreError::NotFound(format!("room {room_id}")));
            }
            conn.execute(
                "INSERT INTO messages (id, room_id, message, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.id.to_string(),
                    room_id.to_string(),
                    message.message,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })?;
        Ok(message)
    }

    #[instrument(skip(self), fields(message_id = %id))]
    pub fn get(&self, id: &MessageId) -> Result<Message, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.to_string()])?;
            match rows.next()? {
                Some(row) => row_to_message(row),
                None => Err(StoreError::NotFound(format!("message {id}"))),
            }
        })
    }

    /// Messages of one room in posting order.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn list_for_room(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE room_id = ?1 ORDER BY seq"))?;
            let mut rows = stmt.query([room_id.to_string()])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(row_to_message(row)?);
            }
            Ok(messages)
        })
    }

    /// Add one reaction and return the new count.
    pub fn increment_reaction(&self, id: &MessageId) -> Result<i64, StoreError> {
        self.update_count(id, "UPDATE messages SET reaction_count = reaction_count + 1 WHERE id = ?1 RETURNING reaction_count")
    }

    /// Remove one reaction, clamping at zero, and return the new count.
    pub fn decrement_reaction(&self, id: &MessageId) -> Result<i64, StoreError> {
        self.update_count(
            id,
            "UPDATE messages SET reaction_count = MAX(reaction_count - 1, 0) WHERE id = ?1 RETURNING reaction_count",
        )
    }

    fn update_count(&self, id: &MessageId, sql: &str) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(sql, [id.to_string()], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
        })
    }

    /// Set the answered flag. Returns `false` when it was already set.
    pub fn mark_answered(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let previous: Option<bool> = conn
                .query_row("SELECT answered FROM messages WHERE id = ?1", [id.to_string()], |row| row.get(0))
                .optional()?;
            match previous {
                None => Err(StoreError::NotFound(format!("message {id}"))),
                Some(true) => Ok(false),
                Some(false) => {
                    let _ = conn.execute("UPDATE messages SET answered = 1 WHERE id = ?1", [id.to_string()])?;
                    Ok(true)
                }
            }
        })
    }
}
