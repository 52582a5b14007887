use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use whisper_types::api::{ReadQuery, SendMessageRequest, SetPinnedRequest};

use crate::AppState;
use crate::error::ApiError;

/// Messages in display order with their plaintext. Messages that cannot be
/// opened come back as `unreadable` instead of failing the request.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.display_messages(chat_id)?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .store
        .send_message(chat_id, req.content, req.kind, req.metadata)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.delete_message(chat_id, message_id)? {
        debug!(chat_id = %chat_id, message_id = %message_id, "delete of absent message");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `?reader_id=` marks on behalf of another participant.
pub async fn mark_read(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ReadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let changed = match query.reader_id {
        Some(reader) => state.store.mark_read_as(&reader, chat_id, message_id)?,
        None => state.store.mark_read(chat_id, message_id)?,
    };
    Ok(Json(serde_json::json!({ "changed": changed })))
}

pub async fn set_pinned(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetPinnedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.store.set_pinned(chat_id, message_id, req.pinned)?;
    Ok(Json(message))
}
