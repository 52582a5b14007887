use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use whisper_types::api::ToggleReactionRequest;

use crate::AppState;
use crate::error::ApiError;

/// Toggle a reaction and return the updated message. Without a `user_id`
/// the local user reacts.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = req
        .user_id
        .unwrap_or_else(|| state.store.user_id().to_string());
    let message = state
        .store
        .toggle_reaction(chat_id, message_id, &req.emoji, &user_id)?;
    Ok(Json(message))
}
