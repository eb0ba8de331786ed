//! Events pushed to room watchers.
//!
//! On the wire every event is `{"kind": ..., "value": {...}}`. The room an
//! event belongs to is only used for routing and never leaves the process.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId};

/// Discriminant of an [`EventPayload`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageCreated,
    ReactionIncreased,
    ReactionDecreased,
    MessageAnswered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreated => "message_created",
            Self::ReactionIncreased => "reaction_increased",
            Self::ReactionDecreased => "reaction_decreased",
            Self::MessageAnswered => "message_answered",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific body of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EventPayload {
    MessageCreated { id: MessageId, message: String },
    ReactionIncreased { id: MessageId, count: i64 },
    ReactionDecreased { id: MessageId, count: i64 },
    MessageAnswered { id: MessageId },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageCreated { .. } => EventKind::MessageCreated,
            Self::ReactionIncreased { .. } => EventKind::ReactionIncreased,
            Self::ReactionDecreased { .. } => EventKind::ReactionDecreased,
            Self::MessageAnswered { .. } => EventKind::MessageAnswered,
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Self::MessageCreated { id, .. }
            | Self::ReactionIncreased { id, .. }
            | Self::ReactionDecreased { id, .. }
            | Self::MessageAnswered { id } => *id,
        }
    }
}

/// A payload addressed to one room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub room_id: RoomId,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(room_id: RoomId, payload: EventPayload) -> Self {
        Self { room_id, payload }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serialize the watcher-facing JSON (room id excluded).
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_created_wire_shape() {
        let id = MessageId::new();
        let event = Event::new(
            RoomId::new(),
            EventPayload::MessageCreated {
                id,
                message: "hello".into(),
            },
        );
        let value: serde_json::Value = serde_json::from_str(&event.to_wire().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"kind": "message_created", "value": {"id": id.to_string(), "message": "hello"}})
        );
    }

    #[test]
    fn reaction_events_carry_count() {
        let id = MessageId::new();
        let up = EventPayload::ReactionIncreased { id, count: 2 };
        let down = EventPayload::ReactionDecreased { id, count: 1 };
        let up_json = serde_json::to_value(&up).unwrap();
        let down_json = serde_json::to_value(&down).unwrap();
        assert_eq!(up_json["kind"], "reaction_increased");
        assert_eq!(up_json["value"]["count"], 2);
        assert_eq!(down_json["kind"], "reaction_decreased");
        assert_eq!(down_json["value"]["count"], 1);
    }

    #[test]
    fn wire_never_includes_room_id() {
        let room = RoomId::new();
        let event = Event::new(room, EventPayload::MessageAnswered { id: MessageId::new() });
        let wire = event.to_wire().unwrap();
        assert!(!wire.contains(&room.to_string()));
        assert!(!wire.contains("room"));
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let id = MessageId::new();
        let payloads = [
            EventPayload::MessageCreated { id, message: "m".into() },
            EventPayload::ReactionIncreased { id, count: 1 },
            EventPayload::ReactionDecreased { id, count: 0 },
            EventPayload::MessageAnswered { id },
        ];
        for payload in payloads {
            let value = serde_json::to_value(&payload).unwrap();
            assert_eq!(value["kind"], payload.kind().as_str());
            assert_eq!(payload.message_id(), id);
        }
    }

    #[test]
    fn wire_parses_back() {
        let raw = r#"{"kind":"message_answered","value":{"id":"0190b6d2-7c4e-7a3b-9f21-3c1d2e4f5a6b"}}"#;
        let payload: EventPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.kind(), EventKind::MessageAnswered);
    }
}
