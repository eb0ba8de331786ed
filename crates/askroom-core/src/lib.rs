//! Domain vocabulary shared by the store and the server: typed identifiers,
//! room and message rows, and the events watchers receive.

pub mod events;
pub mod ids;
pub mod models;

pub use events::{Event, EventKind, EventPayload};
pub use ids::{InvalidId, MessageId, RoomId};
pub use models::{Message, Room};
