use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;
use whisper_core::ChatError;

/// A [`ChatError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ChatError::ChatNotFound(_)
            | ChatError::MessageNotFound(_)
            | ChatError::ContactNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::InvalidParticipant(_) => StatusCode::BAD_REQUEST,
            ChatError::EncryptionFailed(_) | ChatError::DecryptionFailed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ChatError::PersistenceWriteFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::PersistenceReadCorrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
