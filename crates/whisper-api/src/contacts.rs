use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use whisper_core::{ChatError, ContactPatch};
use whisper_types::Contact;
use whisper_types::api::{AddContactRequest, ContactQuery, UpdateContactRequest};

use crate::AppState;
use crate::error::ApiError;

pub async fn list_contacts(
    State(state): State<AppState>,
    Query(query): Query<ContactQuery>,
) -> impl IntoResponse {
    match query.q {
        Some(q) => Json(state.store.search_contacts(&q)),
        None => Json(state.store.contacts()),
    }
}

pub async fn add_contact(
    State(state): State<AppState>,
    Json(req): Json<AddContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut contact = Contact::new(id, req.display_name);
    contact.avatar_ref = req.avatar_ref;

    let contact = state.store.add_contact(contact)?;
    Ok((StatusCode::CREATED, Json(contact)))
}

/// Partial update applied in one store call.
pub async fn update_contact(
    State(state): State<AppState>,
    Path(contact_id): Path<String>,
    Json(req): Json<UpdateContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let patch = ContactPatch {
        display_name: req.display_name,
        avatar_ref: req.avatar_ref,
        is_favorite: req.is_favorite,
        is_blocked: req.is_blocked,
        presence_state: req.presence_state,
    };
    Ok(Json(state.store.patch_contact(&contact_id, patch)?))
}

pub async fn remove_contact(
    State(state): State<AppState>,
    Path(contact_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.remove_contact(&contact_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChatError::ContactNotFound(contact_id).into())
    }
}
