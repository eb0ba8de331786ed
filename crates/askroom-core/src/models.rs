use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId};

/// A topic under which questions are posted and watched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub theme: String,
}

/// A question posted into a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub message: String,
    /// Never negative; decrements clamp at zero.
    pub reaction_count: i64,
    pub answered: bool,
}

impl Message {
    /// A freshly posted message: no reactions, unanswered.
    pub fn new(room_id: RoomId, message: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            message: message.into(),
            reaction_count: 0,
            answered: false,
        }
    }
}
