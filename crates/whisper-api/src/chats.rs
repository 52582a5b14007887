use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use whisper_types::api::{
    CreateChatRequest, SetTypingRequest, TotalUnreadResponse, TypingResponse, UnreadResponse,
    UpdateSettingsRequest,
};

use crate::AppState;
use crate::error::ApiError;

pub async fn list_chats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.chats())
}

pub async fn create_chat(
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.store.create_chat(&req.participant_id, req.kind)?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.chat(chat_id)?))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.delete_chat(chat_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(whisper_core::ChatError::ChatNotFound(chat_id).into())
    }
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.update_settings(chat_id, req.settings)?))
}

pub async fn pinned_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.pinned_messages(chat_id)?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = state.store.unread_count(chat_id)?;
    Ok(Json(UnreadResponse { chat_id, unread }))
}

pub async fn total_unread(State(state): State<AppState>) -> impl IntoResponse {
    Json(TotalUnreadResponse {
        unread: state.store.total_unread(),
    })
}

pub async fn typing_user(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.chat(chat_id)?;
    Ok(Json(TypingResponse {
        chat_id,
        user_id: state.store.typing_user(chat_id),
    }))
}

/// Without a `user_id` the local user is the typer.
pub async fn set_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SetTypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = req
        .user_id
        .unwrap_or_else(|| state.store.user_id().to_string());
    state.store.set_typing(chat_id, &user_id, req.is_typing)?;
    Ok(StatusCode::NO_CONTENT)
}
