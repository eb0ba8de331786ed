use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;

use askroom_core::{Room, RoomId};

use crate::database::Database;
use crate::error::StoreError;

pub struct RoomRepo {
    db: Database,
}

fn row_to_room(row: &rusqlite::Row<'_>) -> Result<Room, StoreError> {
    let raw: String = row.get(0)?;
    let id = raw.parse::<RoomId>().map_err(|e| StoreError::CorruptRow {
        table: "rooms",
        column: "id",
        detail: e.to_string(),
    })?;
    Ok(Room {
        id,
        theme: row.get(1)?,
    })
}

impl RoomRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, theme))]
    pub fn create(&self, theme: &str) -> Result<Room, StoreError> {
        let room = Room {
            id: RoomId::new(),
            theme: theme.to_string(),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, theme, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![room.id.to_string(), room.theme, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(room)
    }

    #[instrument(skip(self), fields(room_id = %id))]
    pub fn get(&self, id: &RoomId) -> Result<Room, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, theme FROM rooms WHERE id = ?1")?;
            let mut rows = stmt.query([id.to_string()])?;
            match rows.next()? {
                Some(row) => row_to_room(row),
                None => Err(StoreError::NotFound(format!("room {id}"))),
            }
        })
    }

    pub fn exists(&self, id: &RoomId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM rooms WHERE id = ?1", [id.to_string()], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// List all rooms, oldest first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Room>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, theme FROM rooms ORDER BY rowid")?;
            let mut rows = stmt.query([])?;
            let mut rooms = Vec::new();
            while let Some(row) = rows.next()? {
                rooms.push(row_to_room(row)?);
            }
            Ok(rooms)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RoomRepo {
        RoomRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_and_get() {
        let repo = repo();
        let room = repo.create("rust async").unwrap();
        let fetched = repo.get(&room.id).unwrap();
        assert_eq!(fetched, room);
    }

    #[test]
    fn get_missing_is_not_found() {
        let err = repo().get(&RoomId::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn exists_reflects_inserts() {
        let repo = repo();
        let room = repo.create("a").unwrap();
        assert!(repo.exists(&room.id).unwrap());
        assert!(!repo.exists(&RoomId::new()).unwrap());
    }

    #[test]
    fn list_in_creation_order() {
        let repo = repo();
        assert!(repo.list().unwrap().is_empty());
        let a = repo.create("a").unwrap();
        let b = repo.create("b").unwrap();
        let all = repo.list().unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[test]
    fn corrupt_id_reported() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, theme, created_at) VALUES ('nope', 't', 'now')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        let err = RoomRepo::new(db).list().unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { table: "rooms", column: "id", .. }));
    }
}
