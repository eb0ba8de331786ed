//! HTTP handlers: validate, then call the store and notify watchers under the
//! room's write lock.

use askroom_core::{EventPayload, Message, MessageId, Room, RoomId};
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::health::{self, HealthResponse};
use crate::server::AppState;
use crate::socket;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub theme: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

fn required_text<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value)
}

/// Fetch a message and make sure it lives in `room_id`, so events never go
/// to a room the message does not belong to.
async fn load_message(state: &AppState, room_id: RoomId, message_id: MessageId) -> Result<Message, ApiError> {
    let message = state.store.get_message(&message_id).await?;
    if message.room_id != room_id {
        return Err(ApiError::NotFound(format!("message {message_id} not found in room {room_id}")));
    }
    Ok(message)
}

/// Broadcast an acknowledged write. Dead watchers are already logged by the
/// registry.
fn announce(state: &AppState, room_id: RoomId, payload: EventPayload) {
    let report = state.dispatcher.notify(room_id, payload);
    debug!(
        room_id = %room_id,
        delivered = report.delivered,
        dropped = report.dropped,
        "write announced"
    );
}

fn parse_ids(room_id: &str, message_id: &str) -> Result<(RoomId, MessageId), ApiError> {
    Ok((room_id.parse()?, message_id.parse()?))
}

/// GET /subscribe/{room_id}
pub async fn subscribe(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let room_id: RoomId = room_id.parse()?;
    // Registered before the upgrade: if anything below fails the subscription
    // is dropped and torn down with it.
    let subscription = state.subscriptions.open(room_id).await?;
    let upgrade = upgrade.map_err(|e| ApiError::TransportUpgradeFailed(e.body_text()))?;

    let heartbeat = state.heartbeat;
    Ok(upgrade
        .on_failed_upgrade(move |e| warn!(room_id = %room_id, error = %e, "websocket upgrade failed"))
        .on_upgrade(move |ws| socket::run_socket(ws, subscription, heartbeat))
        .into_response())
}

/// POST /api/rooms
pub async fn create_room(
    State(state): State<AppState>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<Json<IdResponse>, ApiError> {
    let Json(body) = body?;
    let theme = required_text(&body.theme, "theme")?;
    let room = state.store.create_room(theme).await?;
    info!(room_id = %room.id, "room created");
    Ok(Json(IdResponse { id: room.id.to_string() }))
}

/// GET /api/rooms
pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, ApiError> {
    Ok(Json(state.store.list_rooms().await?))
}

/// GET /api/rooms/{room_id}
pub async fn get_room(State(state): State<AppState>, Path(room_id): Path<String>) -> Result<Json<Room>, ApiError> {
    let room_id: RoomId = room_id.parse()?;
    Ok(Json(state.store.get_room(&room_id).await?))
}

/// POST /api/rooms/{room_id}/messages
pub async fn create_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    body: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<Json<IdResponse>, ApiError> {
    let room_id: RoomId = room_id.parse()?;
    let Json(body) = body?;
    let text = required_text(&body.message, "message")?;

    let _order = state.dispatcher.write_lock(room_id).await;
    let message = state.store.create_message(&room_id, text).await?;
    announce(
        &state,
        room_id,
        EventPayload::MessageCreated {
            id: message.id,
            message: message.message,
        },
    );
    Ok(Json(IdResponse { id: message.id.to_string() }))
}

/// GET /api/rooms/{room_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let room_id: RoomId = room_id.parse()?;
    state.store.get_room(&room_id).await?;
    Ok(Json(state.store.list_room_messages(&room_id).await?))
}

/// GET /api/rooms/{room_id}/messages/{message_id}
pub async fn get_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
) -> Result<Json<Message>, ApiError> {
    let (room_id, message_id) = parse_ids(&room_id, &message_id)?;
    Ok(Json(load_message(&state, room_id, message_id).await?))
}

/// PATCH /api/rooms/{room_id}/messages/{message_id}/react
pub async fn add_reaction(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
) -> Result<Json<CountResponse>, ApiError> {
    let (room_id, message_id) = parse_ids(&room_id, &message_id)?;
    let message = load_message(&state, room_id, message_id).await?;
    let _order = state.dispatcher.write_lock(room_id).await;
    let count = state.store.increment_reaction(&message.id).await?;
    announce(&state, room_id, EventPayload::ReactionIncreased { id: message.id, count });
    Ok(Json(CountResponse { count }))
}

/// DELETE /api/rooms/{room_id}/messages/{message_id}/react
pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
) -> Result<Json<CountResponse>, ApiError> {
    let (room_id, message_id) = parse_ids(&room_id, &message_id)?;
    let message = load_message(&state, room_id, message_id).await?;
    let _order = state.dispatcher.write_lock(room_id).await;
    let count = state.store.decrement_reaction(&message.id).await?;
    announce(&state, room_id, EventPayload::ReactionDecreased { id: message.id, count });
    Ok(Json(CountResponse { count }))
}

/// PATCH /api/rooms/{room_id}/messages/{message_id}/answer
pub async fn mark_answered(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (room_id, message_id) = parse_ids(&room_id, &message_id)?;
    let message = load_message(&state, room_id, message_id).await?;
    let _order = state.dispatcher.write_lock(room_id).await;
    // Re-marking is accepted but changes nothing, so nothing is broadcast.
    if state.store.mark_answered(&message.id).await? {
        announce(&state, room_id, EventPayload::MessageAnswered { id: message.id });
    }
    Ok(StatusCode::OK)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.room_count(),
        state.registry.connection_count(),
    ))
}
